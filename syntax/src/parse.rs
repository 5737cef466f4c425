use anyhow::Result;

use crate::ast::{ArgTemplate, BidsName, Entity, PathTemplate};

#[derive(Debug, thiserror::Error)]
#[error("ParseError in '{text}' at position {pos}: {msg}")]
pub struct Error {
    msg: String,
    pos: usize,
    text: String,
}

type EasyResult<'a, T> = std::result::Result<(T, &'a str), combine::easy::ParseError<&'a str>>;

// since converting combine's errors is a lifetime nightmare,
// we just stringify the error before returning it.
fn finish<'a, T>(text: &'a str, result: EasyResult<'a, T>) -> Result<T> {
    result.map(|(val, _remainder)| val).map_err(|e| {
        let pos = e.position.translate_position(text);
        Error {
            pos,
            text: text.to_owned(),
            msg: format!("{}", e),
        }
        .into()
    })
}

/// Parse a BIDS file name like `sub-01_ses-1_dwi.nii.gz`.
pub fn parse_bids_name(text: &str) -> Result<BidsName<'_>> {
    use combine::EasyParser;
    finish(text, bids::bids_name().easy_parse(text))
}

/// Parse a single `key-value` directory name like `sub-01`.
pub fn parse_entity(text: &str) -> Result<Entity<'_>> {
    use combine::EasyParser;
    finish(text, bids::entity_dir().easy_parse(text))
}

/// Parse a file-selection template like `sub-{subject_id}/anat/*_T1w.nii.gz`.
pub fn parse_template(text: &str) -> Result<PathTemplate<'_>> {
    use combine::EasyParser;
    finish(text, template::path_template().easy_parse(text))
}

/// Parse a command-line argument template like `-fslgrad %s %s`.
pub fn parse_argstr(text: &str) -> Result<ArgTemplate<'_>> {
    use combine::EasyParser;
    finish(text, argstr::arg_template().easy_parse(text))
}

pub mod prelude {
    pub use combine::parser::char::{char, string};
    pub use combine::parser::range::recognize;
    pub use combine::*;
}

pub mod util {

    use super::prelude::*;
    use combine::parser::char::{alpha_num, letter};

    grammar! {
        ident_start() -> char, {
            char('_').or(letter())
        }
    }

    grammar! {
        ident_rest() -> Vec<char>, {
            many(char('_').or(alpha_num()))
        }
    }

    grammar! {
        ident() -> &'a str, {
            recognize(ident_start().and(ident_rest()))
        }
    }

    // BIDS labels are alphanumeric, and can start w/ a number.
    grammar! {
        label() -> &'a str, {
            recognize(skip_many1(alpha_num()))
        }
    }

    enclosed! {
        parens(parser), {
            char('(').with(parser).skip(char(')'))
        }
    }

    enclosed! {
        braces(parser), {
            char('{').with(parser).skip(char('}'))
        }
    }

}

mod bids {
    use super::prelude::*;
    use super::util::label;
    use crate::ast::{BidsName, Entity};

    grammar! {
        chunk() -> (&'a str, Option<&'a str>), {
            label().and(optional(char('-').with(label())))
        }
    }

    grammar! {
        extension() -> &'a str, {
            char('.').with(recognize(skip_many1(any())))
        }
    }

    grammar! {
        bids_name() -> BidsName<'a>, {
            sep_by1(chunk(), char('_'))
                .and(optional(extension()))
                .skip(eof())
                .map(|(chunks, ext): (Vec<_>, _)| BidsName::from_chunks(chunks, ext))
        }
    }

    grammar! {
        entity_dir() -> Entity<'a>, {
            label()
                .skip(char('-'))
                .and(label())
                .skip(eof())
                .map(|(key, value)| Entity::new(key, value))
        }
    }

    #[cfg(test)]
    mod test {
        use super::super::{parse_bids_name, parse_entity};
        use crate::ast::Entity;
        use anyhow::Result;

        #[test]
        fn test_full_name() -> Result<()> {
            let name = parse_bids_name("sub-01_ses-1_ap_dwi.nii.gz")?;
            assert_eq!(
                vec![Entity::new("sub", "01"), Entity::new("ses", "1")],
                name.entities
            );
            assert_eq!(vec!["ap"], name.labels);
            assert_eq!(Some("dwi"), name.suffix);
            assert_eq!(Some("nii.gz"), name.extension);
            assert_eq!(Some("01"), name.get("sub"));
            Ok(())
        }

        #[test]
        fn test_inherited_sidecar_name() -> Result<()> {
            let sidecar = parse_bids_name("ses-1_dwi.json")?;
            let file = parse_bids_name("sub-01_ses-1_dwi.nii.gz")?;
            let other = parse_bids_name("sub-01_ses-2_dwi.nii.gz")?;
            assert!(sidecar.entities_subset_of(&file));
            assert!(!sidecar.entities_subset_of(&other));
            Ok(())
        }

        #[test]
        fn test_no_suffix() -> Result<()> {
            let name = parse_bids_name("sub-01")?;
            assert_eq!(None, name.suffix);
            assert_eq!(None, name.extension);
            Ok(())
        }

        #[test]
        fn test_entity_dir() -> Result<()> {
            assert_eq!(Entity::new("ses", "pre1"), parse_entity("ses-pre1")?);
            assert!(parse_entity("sub-01_ses-1").is_err());
            assert!(parse_entity(".DS_Store").is_err());
            Ok(())
        }
    }
}

mod template {
    use super::prelude::*;
    use super::util::{braces, ident};
    use crate::ast::{PathTemplate, TemplatePart};

    grammar! {
        field() -> TemplatePart<'a>, {
            braces(ident()).map(TemplatePart::Field)
        }
    }

    grammar! {
        wildcard() -> TemplatePart<'a>, {
            char('*').map(|_| TemplatePart::Wildcard)
        }
    }

    grammar! {
        literal_run() -> TemplatePart<'a>, {
            recognize(skip_many1(none_of("{}*".chars()))).map(TemplatePart::Literal)
        }
    }

    grammar! {
        path_template() -> PathTemplate<'a>, {
            many1(choice((field(), wildcard(), literal_run())))
                .skip(eof())
                .map(|parts| PathTemplate { parts })
        }
    }

    #[cfg(test)]
    mod test {
        use super::super::parse_template;
        use crate::ast::TemplatePart::*;
        use anyhow::Result;

        #[test]
        fn test_template() -> Result<()> {
            let t = parse_template("sub-{subject_id}/dwi/sub-{subject_id}_dwi.bv*")?;
            assert_eq!(
                vec![
                    Literal("sub-"),
                    Field("subject_id"),
                    Literal("/dwi/sub-"),
                    Field("subject_id"),
                    Literal("_dwi.bv"),
                    Wildcard,
                ],
                t.parts
            );
            assert!(t.has_wildcard());
            assert_eq!(vec!["subject_id", "subject_id"], t.fields().collect::<Vec<_>>());
            Ok(())
        }

        #[test]
        fn test_unclosed_field() {
            assert!(parse_template("sub-{subject_id/anat").is_err());
        }
    }
}

mod argstr {
    use super::prelude::*;
    use super::util::{ident, parens};
    use crate::ast::{ArgPart, ArgTemplate, ArgToken, Conversion};
    use combine::parser::char::spaces;

    grammar! {
        conversion() -> Conversion, {
            choice((
                char('s').map(|_| Conversion::Str),
                char('d').map(|_| Conversion::Int),
                char('f').map(|_| Conversion::Float),
                char('g').map(|_| Conversion::General),
            ))
        }
    }

    grammar! {
        arg_part() -> ArgPart<'a>, {
            choice((
                attempt(string("%%")).map(|_| ArgPart::Literal("%")),
                attempt(char('%').with(parens(ident())).and(conversion()))
                    .map(|(name, conv)| ArgPart::Named(name, conv)),
                char('%').with(conversion()).map(ArgPart::Placeholder),
                recognize(skip_many1(satisfy(|c: char| c != '%' && !c.is_whitespace())))
                    .map(ArgPart::Literal),
            ))
        }
    }

    grammar! {
        arg_token() -> ArgToken<'a>, {
            many1(arg_part()).map(|parts| ArgToken { parts })
        }
    }

    grammar! {
        arg_template() -> ArgTemplate<'a>, {
            spaces()
                .with(many(arg_token().skip(spaces())))
                .skip(eof())
                .map(|tokens| ArgTemplate { tokens })
        }
    }

    #[cfg(test)]
    mod test {
        use super::super::parse_argstr;
        use crate::ast::{ArgPart::*, Conversion};
        use anyhow::Result;

        #[test]
        fn test_flag() -> Result<()> {
            let t = parse_argstr("-force")?;
            assert_eq!(1, t.tokens.len());
            assert_eq!(vec![Literal("-force")], t.tokens[0].parts);
            assert_eq!(0, t.placeholders());
            Ok(())
        }

        #[test]
        fn test_tuple() -> Result<()> {
            let t = parse_argstr("-export_grad_fsl %s %s")?;
            assert_eq!(3, t.tokens.len());
            assert_eq!(2, t.placeholders());
            assert_eq!(vec![Placeholder(Conversion::Str)], t.tokens[2].parts);
            Ok(())
        }

        #[test]
        fn test_mixed_token() -> Result<()> {
            let t = parse_argstr("%d -pow -sub -abs -sqrt")?;
            assert_eq!(5, t.tokens.len());
            assert_eq!(vec![Placeholder(Conversion::Int)], t.tokens[0].parts);
            let t = parse_argstr("--prefix=%s_out %(other)f 100%%")?;
            assert_eq!(
                vec![Literal("--prefix="), Placeholder(Conversion::Str), Literal("_out")],
                t.tokens[0].parts
            );
            assert_eq!(vec![Named("other", Conversion::Float)], t.tokens[1].parts);
            assert_eq!(vec![Literal("100"), Literal("%")], t.tokens[2].parts);
            Ok(())
        }

        #[test]
        fn test_bad_conversion() {
            assert!(parse_argstr("-number %q").is_err());
        }
    }
}

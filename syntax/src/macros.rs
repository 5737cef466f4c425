/// Declare a `combine` parser over `&str` input, e.g.
/// `grammar! { label() -> &'a str, { recognize(skip_many1(alpha_num())) } }`.
/// Every grammar in this crate (BIDS names, path templates, argument templates)
/// is a borrowed-range parser, so the stream bounds are fixed here.
macro_rules! grammar (
    ($name:ident( $($arg: ident : $arg_type: ty),* ) -> $ret:ty, $code:expr) => (
        combine::parser! {
            pub fn $name['a, I]($($arg : $arg_type),*)(I) -> $ret
            where [
                I: combine::stream::RangeStream<Range = &'a str, Token = char>,
                I::Error: combine::ParseError<
                    char,
                    &'a str,
                    <I as combine::stream::StreamOnce>::Position,
                >,
            ]
            {
                $code
            }
        }
    );
);

/// Declare a parser that surrounds another one, returning the inner parser's
/// output, e.g. the braces around a `{field}` in a path template.
macro_rules! enclosed (
    ($name:ident($inner: ident), $code:expr) => (
        combine::parser! {
            pub fn $name['a, I, P]($inner: P)(I) -> P::Output
            where [
                I: combine::stream::RangeStream<Range = &'a str, Token = char>,
                I::Error: combine::ParseError<
                    char,
                    &'a str,
                    <I as combine::stream::StreamOnce>::Position,
                >,
                P: combine::Parser<I>,
            ]
            {
                $code
            }
        }
    );
);

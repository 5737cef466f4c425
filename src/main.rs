fn main() -> anyhow::Result<()> {
    pipetography::run()
}

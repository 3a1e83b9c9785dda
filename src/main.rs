fn main() -> anyhow::Result<()> {
    vigilant_lib::run()
}

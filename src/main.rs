fn main() -> anyhow::Result<()> {
    teatime::run_from_args(std::env::args())
}

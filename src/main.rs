use clap::Parser;

fn main() -> anyhow::Result<()> {
    let cfg = u2fkey::config::Config::parse();
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(u2fkey::run(cfg))
}

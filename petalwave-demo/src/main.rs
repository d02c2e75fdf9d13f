mod cli;

fn main() {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let options = match cli::Options::parse(&args) {
        Ok(options) => options,
        Err(e) => {
            eprintln!("{}\n\n{}", e, cli::USAGE);
            std::process::exit(2);
        }
    };

    if let Err(e) = cli::run(options) {
        log::error!("{:#}", e);
        std::process::exit(1);
    }
}

use clap::Parser;

fn main() {
    let cli = inkpostctl::Cli::parse();
    inkpostctl::init_tracing(cli.verbose);
    if let Err(err) = inkpostctl::run(cli) {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}

use clap::Parser;

fn main() {
    dotenvy::dotenv().ok();
    let cli = reelpipectl::Cli::parse();
    reelpipectl::init_tracing(cli.verbose);
    if let Err(err) = reelpipectl::run(cli) {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}

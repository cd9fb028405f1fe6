use clap::Parser;

fn main() {
    let cli = cvsyncctl::Cli::parse();
    if let Err(err) = cvsyncctl::run(cli) {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}

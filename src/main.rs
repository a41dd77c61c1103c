fn main() {
    use clap::Parser;
    use std::error::Error;
    let args = match tumblr_scraper::cli::Args::try_parse() {
        Ok(args) => args,
        Err(e) => {
            let code = tumblr_scraper::cli::arg_error_exit_code(&e);
            if code == 0 {
                e.exit();
            }
            let _ = e.print();
            std::process::exit(code);
        }
    };

    // RUST_LOG wins over --quiet / --verbose.
    let default_filter = if args.quiet {
        "error"
    } else if args.verbose {
        "warn,tumblr_scraper=debug"
    } else {
        "warn"
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = tumblr_scraper::cli::run(&args) {
        eprintln!("{}", e);
        if args.verbose {
            let mut source = e.source();
            while let Some(s) = source {
                eprintln!("  cause: {}", s);
                source = s.source();
            }
        }
        std::process::exit(e.exit_code());
    }
}

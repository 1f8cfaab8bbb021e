mod app;
mod images;
mod layout;
mod models;
mod paging;
mod perf;
mod source;

use app::{AppArgs, PinFeedApp};
use tracing_subscriber::filter::Directive;
use tracing_subscriber::EnvFilter;

fn main() {
    let mut filter = EnvFilter::from_default_env();
    match "pinfeed=info".parse::<Directive>() {
        Ok(directive) => filter = filter.add_directive(directive),
        Err(e) => eprintln!("Ignoring log directive: {e}"),
    }
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let args = match AppArgs::parse() {
        Ok(args) => args,
        Err(e) => {
            eprintln!("{e:#}");
            std::process::exit(2);
        }
    };

    let app = PinFeedApp::new(args);
    std::process::exit(app.run());
}

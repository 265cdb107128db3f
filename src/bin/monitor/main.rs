//! `fanlog-monitor`: subscribe to remote fanlog publishers and write their
//! records to a local log file (or stdout).

use ansi_term::Colour;
use fanlog::{
    basic_config, debug, handler::file::OpenMode, info, FilterSet, ReceiverConfig, Result,
};
use structopt::StructOpt;

#[derive(Debug, StructOpt)]
#[structopt(
    name = "fanlog-monitor",
    about = "Remotely monitor fanlog-enabled programs"
)]
struct Opts {
    /// Defines the logging levels.
    #[structopt(
        short = "l",
        long = "logfilters",
        value_name = "prefix:level[,prefix:level]*",
        default_value = ":output"
    )]
    logfilters: FilterSet,

    /// Defines the file where logging should be output. The character '-'
    /// represents standard output.
    #[structopt(long = "logfile", value_name = "FILE", default_value = "-")]
    logfile: String,

    /// If set, bind to the given URLs; otherwise, connect to them.
    #[structopt(long = "bind")]
    bind: bool,

    /// Publisher endpoints (tcp://host:port) to subscribe to.
    #[structopt(name = "URL", required = true)]
    urls: Vec<String>,
}

fn run(opts: Opts) -> Result<()> {
    let progname = std::env::var("PROGNAME")
        .ok()
        .or_else(|| std::env::args().next())
        .unwrap_or_else(|| "fanlog-monitor".to_string());

    let config = basic_config(
        &progname,
        &opts.logfile,
        OpenMode::Append,
        opts.logfilters.clone(),
    );
    fanlog::init(config)?;
    fanlog::install_sighandler()?;
    fanlog::reconfigure(opts.logfilters.clone())?;

    let logger = fanlog::logger("fanlog.monitor");
    debug!(logger, "progname: {}", progname);
    info!(
        logger,
        "{} to {} url(s)",
        if opts.bind { "binding" } else { "connecting" },
        opts.urls.len()
    );

    let result = fanlog::recv(&ReceiverConfig {
        urls: opts.urls.clone(),
        bind: opts.bind,
    });

    let finalized = fanlog::finalize(true);
    result.and(finalized)
}

fn main() {
    let opts = Opts::from_args();
    if let Err(error) = run(opts) {
        eprintln!("{} {}", Colour::Red.paint("error:"), error);
        std::process::exit(error.code());
    }
}

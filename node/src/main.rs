use std::path::PathBuf;
use std::sync::Arc;
use std::{env, thread};

use anyhow::Context as _;
use argh::FromArgs;

use radicle_node::control;
use radicle_node::handle::Handle;
use radicle_node::Policies;
use shared::LogFmt;

/// Radicle Node.
#[derive(FromArgs)]
pub struct Options {
    /// seeding and follow policy file, created if missing
    #[argh(option)]
    pub policies: PathBuf,

    /// control socket path (default: radicle.sock in the temporary directory)
    #[argh(option)]
    pub socket: Option<PathBuf>,

    /// either "plain" or "json"
    #[argh(option, default = "LogFmt::Plain")]
    pub log_format: LogFmt,
}

impl Options {
    pub fn from_env() -> Self {
        argh::from_env()
    }
}

fn main() -> anyhow::Result<()> {
    let options = Options::from_env();

    shared::init_logger(options.log_format);

    let policies = Policies::open(&options.policies).with_context(|| {
        format!(
            "failed to open policy file {}",
            options.policies.display()
        )
    })?;
    let policies = Arc::new(policies);
    let socket = options
        .socket
        .unwrap_or_else(|| env::temp_dir().join(control::DEFAULT_SOCKET_NAME));

    for policy in policies.seeding_policies() {
        log::debug!(
            "Seeding {} (scope={}, fetch={})",
            policy.rid,
            policy.scope,
            policy.fetch
        );
    }
    log::info!(
        "Seeding {} repositories, following {} nodes",
        policies.list_inventory().len(),
        policies.follows().len()
    );

    let handle = Handle::new(policies.clone());
    let control = thread::spawn(move || control::listen(socket, handle));

    match control.join() {
        Ok(result) => result?,
        Err(_) => anyhow::bail!("control socket thread panicked"),
    }
    policies.flush()?;

    Ok(())
}

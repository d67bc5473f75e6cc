pub mod post_receive;
pub mod pre_receive;
pub mod storage;
pub mod types;

use std::io::BufRead;

use radicle_patches::push::{Options, Push};

use crate::error::Error;
use types::{ReceivePackEnv, RefUpdate};

/// Read the reference updates passed to a hook, one per line.
pub fn read_updates<R: BufRead>(input: R) -> Result<Vec<RefUpdate>, Error> {
    let mut updates = Vec::new();

    for line in input.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        updates.push(line.parse()?);
    }
    Ok(updates)
}

/// Turn reference updates into pushes by the authenticated author.
pub fn pushes(env: &ReceivePackEnv, updates: &[RefUpdate]) -> Result<Vec<Push>, Error> {
    let options = Options::parse(env.push_options()?)?;

    Ok(updates
        .iter()
        .map(|u| u.to_push(env.author, options.clone()))
        .collect())
}

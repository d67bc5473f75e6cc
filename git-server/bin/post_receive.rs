//! `post-receive` git hook binary.

use radicle_git_server::error::Error;

#[cfg(feature = "hooks")]
fn main() -> Result<(), Error> {
    use radicle_git_server::hooks::post_receive::PostReceive;

    match PostReceive::hook() {
        Ok(()) => std::process::exit(0),
        Err(e) => {
            eprintln!("error: {}", e);
            // refs are already updated at this point; report the failure to the pusher.
            std::process::exit(1)
        }
    }
}

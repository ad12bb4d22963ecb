//! Signing secret utilities.

use tollgate_core::SigningSecret;

use crate::ui;

/// Print a fresh signing secret.
///
/// The secret goes to stdout on its own line so it can be piped; hints go
/// to stderr.
pub fn run_secret_generate() {
    println!("{}", SigningSecret::generate_hex());
    ui::hint("Set it as auth.signingSecret in the config file, or export TOLLGATE_SIGNING_SECRET");
}

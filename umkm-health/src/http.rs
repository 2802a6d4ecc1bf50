//! Outbound HTTP client construction.

use reqwest::{Client, ClientBuilder};
use std::fmt::Display;

/// Build a client from `builder`, falling back to reqwest defaults on failure.
///
/// The fallback has no timeouts, so it is logged at `warn` with the client's purpose.
pub fn build_client(builder: ClientBuilder, purpose: &str) -> Client {
    client_or_default(builder.build(), purpose)
}

fn client_or_default<E: Display>(built: Result<Client, E>, purpose: &str) -> Client {
    match built {
        Ok(client) => client,
        Err(e) => {
            tracing::warn!(
                client = purpose,
                error = %e,
                "HTTP client build failed, using defaults without timeouts"
            );
            Client::new()
        }
    }
}

//! The request dispatcher.
//!
//! One synchronous call per decoded envelope body: [`Dispatcher::handle`]
//! decodes, routes by request `type`, applies the failure taxonomy, and
//! returns the encoded response envelope. Transport workers call it
//! concurrently; turns for the same `(org, user)` serialize on a per-user
//! lock, turns for different users proceed independently.

use std::{
    collections::HashMap,
    panic::{AssertUnwindSafe, catch_unwind},
    sync::Arc,
    time::Instant,
};

use log::{debug, error, info, warn};
use parking_lot::Mutex;
use regex::Regex;
use tasksync_codec::{Decoder as _, Encoder as _, EnvelopeCodec, EnvelopeDecodeError};
use tasksync_types::{error::Failure, message::Message, response::canonical_status};
use thiserror::Error;

use crate::{
    auth::Authenticator,
    config::Config,
    engine::{self, TieBreak},
    stats::Metrics,
    store::LogStore,
};

const DEFAULT_REQUEST_LIMIT: i64 = 1_048_576;

#[derive(Debug, Error)]
pub enum SetupError {
    #[error("The 'root' setting is required.")]
    MissingRoot,
    #[error("Bad client rule '{pattern}': {source}")]
    BadClientRule {
        pattern: String,
        source: regex::Error,
    },
}

/// One entry of a `client.allow` / `client.deny` list.
#[derive(Clone, Debug)]
enum ClientRule {
    All,
    None,
    Pattern(Regex),
}

fn parse_client_rules(spec: &str) -> Result<Vec<ClientRule>, SetupError> {
    let mut rules = Vec::new();

    for entry in spec.split(',') {
        let entry = entry.trim();
        if entry.is_empty() {
            continue;
        }
        if entry.eq_ignore_ascii_case("all") {
            rules.push(ClientRule::All);
        } else if entry.eq_ignore_ascii_case("none") {
            rules.push(ClientRule::None);
        } else {
            let regex = Regex::new(entry).map_err(|source| SetupError::BadClientRule {
                pattern: entry.to_string(),
                source,
            })?;
            rules.push(ClientRule::Pattern(regex));
        }
    }

    Ok(rules)
}

#[derive(Debug)]
pub struct Dispatcher {
    auth: Authenticator,
    store: LogStore,
    metrics: Metrics,
    locks: Mutex<HashMap<(String, String), Arc<Mutex<()>>>>,
    allow: Vec<ClientRule>,
    deny: Vec<ClientRule>,
    tiebreak: TieBreak,
    request_limit: usize,
}

impl Dispatcher {
    pub fn new(config: &Config) -> Result<Self, SetupError> {
        let root = config.get("root");
        if root.is_empty() {
            return Err(SetupError::MissingRoot);
        }

        let allow_spec = config.get("client.allow");
        let allow = if allow_spec.is_empty() {
            vec![ClientRule::All]
        } else {
            parse_client_rules(allow_spec)?
        };
        let deny = parse_client_rules(config.get("client.deny"))?;

        Ok(Self {
            auth: Authenticator::new(root),
            store: LogStore::new(root),
            metrics: Metrics::new(),
            locks: Mutex::new(HashMap::new()),
            allow,
            deny,
            tiebreak: TieBreak::from_config(config.get("merge.tiebreak")),
            request_limit: config.get_integer_or("request.limit", DEFAULT_REQUEST_LIMIT).max(0)
                as usize,
        })
    }

    pub fn request_limit(&self) -> usize {
        self.request_limit
    }

    /// Service one decoded envelope body, returning the response envelope.
    ///
    /// Never fails: every failure mode becomes a `code`/`status` response.
    pub fn handle(&self, input: &[u8]) -> Vec<u8> {
        let txn = self.metrics.next_transaction();
        let started = Instant::now();

        let serviced = catch_unwind(AssertUnwindSafe(|| self.dispatch(txn, input)));

        let response = match serviced {
            Ok(Ok(response)) => {
                let elapsed = started.elapsed();
                self.metrics.record_service_time(elapsed);
                debug!("[{txn}] Serviced in {:.6}s", elapsed.as_secs_f64());
                response
            }
            Ok(Err(failure)) => {
                self.metrics.record_error();
                info!("[{txn}] ERROR {} {}", failure.code(), failure.status());
                failure_response(&failure)
            }
            Err(_) => {
                self.metrics.record_error();
                error!("[{txn}] Unknown error");
                failure_response(&Failure::Text("Unknown error".to_string()))
            }
        };

        let output = EnvelopeCodec.encode(&response);
        self.metrics
            .record_traffic(input.len() as u64, output.len() as u64);
        output
    }

    fn dispatch(&self, txn: u64, input: &[u8]) -> Result<Message, Failure> {
        // The frame codec already rejected oversized frames; this guards
        // dispatchers fed from other transports.
        if self.request_limit > 0 && input.len() >= self.request_limit {
            return Err(Failure::Code(504));
        }

        let request = EnvelopeCodec.decode(input).map_err(|error| match error {
            EnvelopeDecodeError::NotUtf8 => Failure::Code(401),
            _ => Failure::Code(400),
        })?;

        if !self.client_allowed(request.get_or_empty("client")) {
            return Err(Failure::Code(430));
        }

        match request.get("type") {
            Some("sync") => self.handle_sync(txn, &request),
            Some("statistics") => self.handle_statistics(txn, &request),
            _ => Err(Failure::Code(500)),
        }
    }

    fn handle_sync(&self, txn: u64, request: &Message) -> Result<Message, Failure> {
        self.authenticate(request)?;
        require_header(request, "protocol", "v1")?;

        // Already validated as a safe principal during authentication.
        let org = request.get_or_empty("org");
        let user = request.get_or_empty("user");
        info!("[{txn}] 'sync' from {org}/{user}");

        let lock = self.user_lock(org, user);
        let _guard = lock.lock();

        let server_data = self.store.read_all(org, user)?;
        debug!("[{txn}] Read server data: {} line(s)", server_data.len());

        let outcome = engine::sync_turn(txn, &server_data, request.payload(), self.tiebreak)?;

        if !outcome.appends.is_empty() {
            self.store.append(org, user, &outcome.appends)?;
            debug!(
                "[{txn}] Appended {} line(s) to server data",
                outcome.appends.len()
            );
        }

        let mut response = Message::new();
        response.set("code", outcome.code.to_string());
        response.set("status", canonical_status(outcome.code));
        response.set_payload(outcome.payload);
        Ok(response)
    }

    fn handle_statistics(&self, txn: u64, request: &Message) -> Result<Message, Failure> {
        self.authenticate(request)?;
        require_header(request, "protocol", "v1")?;

        info!("[{txn}] 'statistics'");

        let mut response = Message::new();
        self.metrics.report(&mut response);
        response.set("code", "200");
        response.set("status", canonical_status(200));
        Ok(response)
    }

    fn authenticate(&self, request: &Message) -> Result<(), Failure> {
        self.auth.authenticate(
            request.get_or_empty("org"),
            request.get_or_empty("user"),
            request.get_or_empty("key"),
        )
    }

    fn user_lock(&self, org: &str, user: &str) -> Arc<Mutex<()>> {
        self.locks
            .lock()
            .entry((org.to_string(), user.to_string()))
            .or_default()
            .clone()
    }

    /// Deny rules are consulted first, then allow rules; a client matching
    /// neither list is refused.
    fn client_allowed(&self, client: &str) -> bool {
        for rule in &self.deny {
            match rule {
                ClientRule::None => break,
                ClientRule::All => {
                    info!("client '{client}' denied by 'all'");
                    return false;
                }
                ClientRule::Pattern(regex) if regex.is_match(client) => {
                    info!("client '{client}' denied");
                    return false;
                }
                ClientRule::Pattern(_) => {}
            }
        }

        for rule in &self.allow {
            match rule {
                ClientRule::None => {
                    info!("client '{client}' not allowed by 'none'");
                    return false;
                }
                ClientRule::All => return true,
                ClientRule::Pattern(regex) if regex.is_match(client) => return true,
                ClientRule::Pattern(_) => {}
            }
        }

        warn!("client '{client}' neither denied nor allowed.");
        false
    }
}

fn require_header(request: &Message, name: &str, value: &str) -> Result<(), Failure> {
    if request.get_or_empty(name) != value {
        return Err(Failure::Text(format!(
            "ERROR: Message {name} should be '{value}'"
        )));
    }
    Ok(())
}

/// A failure as a response: `code`, `status`, empty payload.
fn failure_response(failure: &Failure) -> Message {
    let mut response = Message::new();
    response.set("code", failure.code().to_string());
    response.set("status", failure.status());
    response
}

/// The encoded envelope for a bare numeric code, for responses that must be
/// produced without a dispatchable body (framing errors).
pub fn error_envelope(code: u16) -> Vec<u8> {
    EnvelopeCodec.encode(&failure_response(&Failure::Code(code)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_rules() {
        let config_rules = |allow: &str, deny: &str| {
            let allow = if allow.is_empty() {
                vec![ClientRule::All]
            } else {
                parse_client_rules(allow).unwrap()
            };
            (allow, parse_client_rules(deny).unwrap())
        };

        let tests = [
            // (allow, deny, client, expected)
            ("", "", "task 2.3.0", true),
            ("all", "", "task 2.3.0", true),
            ("none", "", "task 2.3.0", false),
            ("", "all", "task 2.3.0", false),
            ("", "none", "task 2.3.0", true),
            ("task .*", "", "task 2.3.0", true),
            ("task .*", "", "evil 1.0", false),
            ("all", "evil .*", "evil 1.0", false),
        ];

        for (allow_spec, deny_spec, client, expected) in tests {
            let (allow, deny) = config_rules(allow_spec, deny_spec);
            let dispatcher = Dispatcher {
                auth: Authenticator::new("/nonexistent"),
                store: LogStore::new("/nonexistent"),
                metrics: Metrics::new(),
                locks: Mutex::new(HashMap::new()),
                allow,
                deny,
                tiebreak: TieBreak::Server,
                request_limit: 0,
            };

            assert_eq!(
                expected,
                dispatcher.client_allowed(client),
                "allow: '{allow_spec}', deny: '{deny_spec}', client: '{client}'"
            );
        }
    }

    #[test]
    fn test_bad_client_rule_is_a_setup_error() {
        assert!(matches!(
            parse_client_rules("task ("),
            Err(SetupError::BadClientRule { .. })
        ));
    }
}

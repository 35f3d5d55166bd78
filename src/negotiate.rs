use std::time::Duration;

use crate::config::PlayerConfig;
use crate::endpoint::{Transport, TransportPreference};
use crate::error::{PlayerError, Result};
use crate::session::StreamSession;
use crate::status::Transition;

/// Picks a working transport by trying candidates one after another.
///
/// The negotiator owns no network resource; every attempt runs inside the
/// session it is given.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportNegotiator {
    order: Vec<Transport>,
    attempt_timeout: Duration,
}

impl TransportNegotiator {
    pub fn new(order: Vec<Transport>, attempt_timeout: Duration) -> Self {
        Self {
            order,
            attempt_timeout,
        }
    }

    pub fn from_config(config: &PlayerConfig) -> Self {
        Self::new(config.probe_order.clone(), config.attempt_timeout)
    }

    /// Transports tried for `preference`, in order.
    pub fn candidates(&self, preference: TransportPreference) -> Vec<Transport> {
        match preference {
            TransportPreference::Auto => self.order.clone(),
            TransportPreference::Only(transport) => vec![transport],
        }
    }

    /// Connect `session` using the first candidate that works.
    ///
    /// Exhausting the candidates is terminal for this call only; the caller
    /// may negotiate again later.
    pub async fn negotiate(
        &self,
        session: &mut StreamSession,
        preference: TransportPreference,
    ) -> Result<Transport> {
        let candidates = self.candidates(preference);
        session.begin_negotiation();

        let mut attempts = Vec::with_capacity(candidates.len());
        for transport in candidates {
            attempts.push(transport);
            session.start_attempt(transport, self.attempt_timeout);
            match session.await_attempt().await {
                Ok(connected) => {
                    log::info!(
                        "negotiated {} after {} attempt(s)",
                        connected,
                        attempts.len()
                    );
                    return Ok(connected);
                }
                Err(err) => log::info!("{} unavailable: {}", transport, err),
            }
        }

        log::warn!(
            "no transport worked for {}",
            session.endpoint().redacted()
        );
        session.report(Transition::NegotiationFailed(attempts.clone()));
        Err(PlayerError::NoCompatibleTransport { attempts })
    }
}

use crate::{
    destination_client::{BroadcastRejected, DestinationChainRpc, MsgSignProphecy},
    types::{Attestation, ProphecyId, RelayerError},
};
use ethers::utils::to_checksum;
use std::{
    collections::{BTreeMap, HashSet, VecDeque},
    sync::Arc,
};
use tracing::{debug, error, info, instrument, warn};

impl From<&Attestation> for MsgSignProphecy {
    fn from(attestation: &Attestation) -> Self {
        Self {
            cosmos_sender: attestation.validator_address.clone(),
            network_descriptor: attestation.network_descriptor,
            prophecy_id: attestation.prophecy_id.clone(),
            ethereum_address: to_checksum(&attestation.signer_address, None),
            signature: format!("0x{}", hex::encode(&attestation.signature)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubmissionLimits {
    /// Settled prophecy ids remembered so rescans do not sign them again
    pub max_tracked: usize,
    /// Failed attestations kept for redelivery
    pub max_pending: usize,
    /// Failed deliveries after which an attestation is given up
    pub max_attempts: u32,
}

impl Default for SubmissionLimits {
    fn default() -> Self {
        Self {
            max_tracked: 10_000,
            max_pending: 1_000,
            max_attempts: 20,
        }
    }
}

#[derive(Debug, Clone)]
struct PendingAttestation {
    attestation: Attestation,
    attempts: u32,
}

/// Tracks which prophecies are settled (accepted, rejected or completed)
/// and which attestations still need to be delivered. Settled ids are
/// remembered up to `max_tracked`, oldest first out.
#[derive(Debug)]
struct AttestationLedger {
    limits: SubmissionLimits,
    settled: HashSet<ProphecyId>,
    settled_order: VecDeque<ProphecyId>,
    pending: BTreeMap<ProphecyId, PendingAttestation>,
}

impl AttestationLedger {
    fn new(limits: SubmissionLimits) -> Self {
        Self {
            limits: SubmissionLimits {
                max_tracked: limits.max_tracked.max(1),
                max_pending: limits.max_pending.max(1),
                max_attempts: limits.max_attempts.max(1),
            },
            settled: HashSet::new(),
            settled_order: VecDeque::new(),
            pending: BTreeMap::new(),
        }
    }

    fn is_known(&self, prophecy_id: &ProphecyId) -> bool {
        self.settled.contains(prophecy_id) || self.pending.contains_key(prophecy_id)
    }

    /// Returns whether an attestation for `prophecy_id` was still queued.
    fn record_settled(&mut self, prophecy_id: ProphecyId) -> bool {
        let was_pending = self.pending.remove(&prophecy_id).is_some();
        if !self.settled.insert(prophecy_id.clone()) {
            return was_pending;
        }
        self.settled_order.push_back(prophecy_id);
        while self.settled_order.len() > self.limits.max_tracked {
            if let Some(evicted) = self.settled_order.pop_front() {
                self.settled.remove(&evicted);
            }
        }
        was_pending
    }

    /// Queues `attestation` for another delivery. Returns the id of an
    /// attestation that was dropped instead: this one once it has used up
    /// its attempts, or the most-retried one when the queue is full.
    fn record_failed(&mut self, attestation: Attestation) -> Option<ProphecyId> {
        let prophecy_id = attestation.prophecy_id.clone();
        let attempts = self.pending.get(&prophecy_id).map_or(0, |p| p.attempts) + 1;
        if attempts >= self.limits.max_attempts {
            self.pending.remove(&prophecy_id);
            return Some(prophecy_id);
        }

        self.pending.insert(
            prophecy_id.clone(),
            PendingAttestation {
                attestation,
                attempts,
            },
        );
        if self.pending.len() <= self.limits.max_pending {
            return None;
        }

        let evicted = self
            .pending
            .iter()
            .filter(|(id, _)| **id != prophecy_id)
            .max_by_key(|(_, pending)| pending.attempts)
            .map(|(id, _)| id.clone())?;
        self.pending.remove(&evicted);
        Some(evicted)
    }
}

/// Delivers attestations to the destination chain.
pub struct Submitter {
    destination: Arc<dyn DestinationChainRpc>,
    ledger: AttestationLedger,
}

impl Submitter {
    pub fn new(destination: Arc<dyn DestinationChainRpc>, limits: SubmissionLimits) -> Self {
        Self {
            destination,
            ledger: AttestationLedger::new(limits),
        }
    }

    /// Whether `prophecy_id` is settled or queued for retry.
    pub fn is_known(&self, prophecy_id: &ProphecyId) -> bool {
        self.ledger.is_known(prophecy_id)
    }

    pub fn pending_count(&self) -> usize {
        self.ledger.pending.len()
    }

    /// Records that the destination chain completed `prophecy_id`. A queued
    /// attestation for it is dropped and it will not be signed again.
    pub fn mark_completed(&mut self, prophecy_id: &ProphecyId) -> bool {
        self.ledger.record_settled(prophecy_id.clone())
    }

    /// Broadcasts `attestation` once. If the destination could not be
    /// reached it is queued and picked up by the next
    /// [`Submitter::retry_pending`]; if the chain rejected it, it is dropped.
    #[instrument(skip(self, attestation), fields(
        prophecy_id = %attestation.prophecy_id,
        network = %attestation.network_descriptor
    ))]
    pub async fn submit(&mut self, attestation: Attestation) -> Result<String, RelayerError> {
        self.deliver(attestation).await
    }

    /// Re-submits every queued attestation once. Returns how many were
    /// accepted.
    #[instrument(skip(self), fields(pending = self.ledger.pending.len()))]
    pub async fn retry_pending(&mut self) -> usize {
        if self.ledger.pending.is_empty() {
            return 0;
        }

        let queued: Vec<Attestation> = self
            .ledger
            .pending
            .values()
            .map(|pending| pending.attestation.clone())
            .collect();
        let mut accepted = 0;
        for attestation in queued {
            if self.deliver(attestation).await.is_ok() {
                accepted += 1;
            }
        }
        debug!(accepted, remaining = self.ledger.pending.len(), "Retried queued submissions");
        accepted
    }

    async fn deliver(&mut self, attestation: Attestation) -> Result<String, RelayerError> {
        let msg = MsgSignProphecy::from(&attestation);
        let prophecy_id = attestation.prophecy_id.clone();

        let source = match self.destination.submit_signed_prophecy(msg).await {
            Ok(tx_hash) => {
                info!(%prophecy_id, %tx_hash, "Signed prophecy submitted");
                self.ledger.record_settled(prophecy_id);
                return Ok(tx_hash);
            }
            Err(source) => source,
        };

        if let Some(rejected) = source.downcast_ref::<BroadcastRejected>() {
            error!(%prophecy_id, code = rejected.code, reason = %rejected.raw_log, "Signed prophecy rejected, not retrying");
            let error = RelayerError::Rejected {
                prophecy_id: prophecy_id.clone(),
                code: rejected.code,
                reason: rejected.raw_log.clone(),
            };
            self.ledger.record_settled(prophecy_id);
            return Err(error);
        }

        warn!(%prophecy_id, error = %source, "Failed to submit signed prophecy, queued for retry");
        if let Some(dropped) = self.ledger.record_failed(attestation) {
            error!(prophecy_id = %dropped, "Giving up on signed prophecy");
        }
        Err(RelayerError::Submission {
            prophecy_id,
            source,
        })
    }
}

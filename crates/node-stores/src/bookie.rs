//! # Reservation Ledger
//!
//! Tracks space promised to inbound replica transfers. Every admission
//! decision (expire, check limits, record) runs under one per-store lock,
//! so two concurrent requests can never both spend the same headroom.
//!
//! ## Admission order
//!
//! 1. `StoreOverloaded` - engine available share below the configured floor
//! 2. `TooManyReservations` - reservation count at its limit
//! 3. `InsufficientSpace` - reserved bytes plus the request would exceed
//!    either the reservation ceiling or the engine's unreserved free space

use node_telemetry::{RESERVATIONS, RESERVATIONS_EXPIRED, RESERVED_BYTES};
use parking_lot::Mutex;
use shared_types::{NodeId, RangeId, StoreId};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use storage_engine::EngineCapacity;

use crate::domain::{RejectReason, ReservationRequest, ReservationResponse, StoreConfig};
use crate::ports::Clock;

/// One outstanding reservation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reservation {
    pub range_id: RangeId,
    pub from_node_id: NodeId,
    pub from_store_id: StoreId,
    pub size_bytes: u64,
    pub expires_at: Instant,
}

#[derive(Debug, Default)]
struct Ledger {
    reservations: HashMap<RangeId, Reservation>,
    reserved_bytes: u64,
}

impl Ledger {
    fn take(&mut self, range_id: RangeId) -> Option<Reservation> {
        let reservation = self.reservations.remove(&range_id)?;
        self.reserved_bytes -= reservation.size_bytes;
        RESERVED_BYTES.sub(reservation.size_bytes as f64);
        Some(reservation)
    }

    fn expire(&mut self, now: Instant) -> usize {
        let expired: Vec<RangeId> = self
            .reservations
            .values()
            .filter(|r| r.expires_at <= now)
            .map(|r| r.range_id)
            .collect();
        for range_id in &expired {
            self.take(*range_id);
        }
        expired.len()
    }
}

/// Per-store reservation ledger.
#[derive(Debug)]
pub struct Bookie {
    store_id: StoreId,
    config: StoreConfig,
    clock: Arc<dyn Clock>,
    ledger: Mutex<Ledger>,
}

impl Bookie {
    pub fn new(store_id: StoreId, config: StoreConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            store_id,
            config,
            clock,
            ledger: Mutex::new(Ledger::default()),
        }
    }

    /// Admit or reject `req` against `capacity`, the engine's current
    /// report.
    ///
    /// A repeated request from the rebalancer that holds the range's
    /// reservation replaces it and is re-admitted with its new size and a
    /// fresh deadline. A request from any other origin is rejected while
    /// the reservation is outstanding.
    pub fn reserve(&self, req: &ReservationRequest, capacity: EngineCapacity) -> ReservationResponse {
        let now = self.clock.now();
        let mut ledger = self.ledger.lock();
        let expired = ledger.expire(now);
        if expired > 0 {
            RESERVATIONS_EXPIRED.inc_by(expired as f64);
        }

        if let Some(existing) = ledger.reservations.get(&req.range_id) {
            if existing.from_node_id != req.from_node_id
                || existing.from_store_id != req.from_store_id
            {
                let reason = RejectReason::RangeAlreadyReserved {
                    holder_node_id: existing.from_node_id,
                    holder_store_id: existing.from_store_id,
                };
                tracing::debug!(
                    store_id = %self.store_id,
                    range_id = %req.range_id,
                    from_node_id = %req.from_node_id,
                    %reason,
                    "[stores] reservation rejected"
                );
                RESERVATIONS.with_label_values(&[reason.label()]).inc();
                return ReservationResponse::rejected(reason);
            }
            // Same rebalancer retrying: drop its old grant and admit the
            // new request against the normal limits.
            ledger.take(req.range_id);
            tracing::debug!(
                store_id = %self.store_id,
                range_id = %req.range_id,
                "[stores] replacing reservation from same origin"
            );
        }

        if let Some(reason) = self.check_admission(&ledger, req.size_bytes, capacity) {
            tracing::debug!(
                store_id = %self.store_id,
                range_id = %req.range_id,
                size_bytes = req.size_bytes,
                %reason,
                "[stores] reservation rejected"
            );
            RESERVATIONS.with_label_values(&[reason.label()]).inc();
            return ReservationResponse::rejected(reason);
        }

        ledger.reservations.insert(
            req.range_id,
            Reservation {
                range_id: req.range_id,
                from_node_id: req.from_node_id,
                from_store_id: req.from_store_id,
                size_bytes: req.size_bytes,
                expires_at: now + self.config.reservation_ttl,
            },
        );
        ledger.reserved_bytes += req.size_bytes;
        RESERVED_BYTES.add(req.size_bytes as f64);
        RESERVATIONS.with_label_values(&["accepted"]).inc();

        tracing::info!(
            store_id = %self.store_id,
            range_id = %req.range_id,
            from_node_id = %req.from_node_id,
            size_bytes = req.size_bytes,
            reserved_bytes = ledger.reserved_bytes,
            "[stores] reservation accepted"
        );
        ReservationResponse::accepted()
    }

    fn check_admission(
        &self,
        ledger: &Ledger,
        size_bytes: u64,
        capacity: EngineCapacity,
    ) -> Option<RejectReason> {
        let available_percent = capacity.available_percent();
        if available_percent < self.config.min_available_percent {
            return Some(RejectReason::StoreOverloaded {
                available_percent,
                required_percent: self.config.min_available_percent,
            });
        }

        if ledger.reservations.len() >= self.config.max_reservations {
            return Some(RejectReason::TooManyReservations {
                limit: self.config.max_reservations,
            });
        }

        let headroom = self
            .config
            .max_reserved_bytes
            .saturating_sub(ledger.reserved_bytes)
            .min(capacity.available.saturating_sub(ledger.reserved_bytes));
        if size_bytes > headroom {
            return Some(RejectReason::InsufficientSpace {
                requested: size_bytes,
                available: headroom,
            });
        }

        None
    }

    /// Consume the reservation for `range_id` because its replica arrived.
    pub fn fill(&self, range_id: RangeId) -> bool {
        let filled = self.ledger.lock().take(range_id).is_some();
        if filled {
            tracing::debug!(store_id = %self.store_id, %range_id, "[stores] reservation filled");
        }
        filled
    }

    /// Cancel the reservation for `range_id`.
    pub fn release(&self, range_id: RangeId) -> bool {
        self.ledger.lock().take(range_id).is_some()
    }

    /// Drop every reservation whose deadline is at or before `now`.
    pub fn expire(&self, now: Instant) -> usize {
        let expired = self.ledger.lock().expire(now);
        if expired > 0 {
            RESERVATIONS_EXPIRED.inc_by(expired as f64);
            tracing::info!(
                store_id = %self.store_id,
                expired,
                "[stores] released expired reservations"
            );
        }
        expired
    }

    pub fn get(&self, range_id: RangeId) -> Option<Reservation> {
        self.ledger.lock().reservations.get(&range_id).cloned()
    }

    /// Sum of outstanding reservation sizes.
    pub fn reserved_bytes(&self) -> u64 {
        self.ledger.lock().reserved_bytes
    }

    pub fn outstanding(&self) -> usize {
        self.ledger.lock().reservations.len()
    }

    /// Release everything, e.g. when the store goes offline.
    pub fn clear(&self) -> usize {
        let mut ledger = self.ledger.lock();
        let ids: Vec<RangeId> = ledger.reservations.keys().copied().collect();
        for range_id in &ids {
            ledger.take(*range_id);
        }
        ids.len()
    }
}

//! Clipboard bridge between the guest seat and the host data-control device.
//!
//! Guest → host: when a guest client sets the selection, a host-side source
//! is created that advertises the same MIME types and forwards every host
//! read straight to the guest source's file descriptor.
//!
//! Host → guest: every offer the host advertises is wrapped in an inbound
//! source collecting its MIME types; when the host selects it, the wrapper
//! is installed as the guest seat selection. Guest reads are forwarded to
//! the host offer.
//!
//! Setting the host selection makes the host echo it back as a new offer.
//! That echo must not reach the guest seat (it would replace the guest's own
//! source with a wrapper of itself), so the outbound path syncs with the host
//! while remote selections are suppressed and parks the echoed offer in a
//! discarded slot.

use std::collections::HashMap;
use std::os::unix::io::{AsFd, OwnedFd};

use crate::core::bridge::{ClipboardHost, GuestSeat, GuestSourceId, OfferId, SourceId};
use crate::util::logging::CLIPBOARD;

// ============================================================================
// Events & Data Types
// ============================================================================

/// Clipboard events delivered by the host connection.
#[derive(Debug)]
pub enum ClipboardEvent {
    /// A new offer was introduced; its MIME types follow.
    DataOffer { offer: OfferId },
    /// One MIME type of a previously introduced offer.
    OfferMimeType { offer: OfferId, mime_type: String },
    /// The host selection changed.
    Selection { offer: Option<OfferId> },
    /// The host primary selection changed.
    PrimarySelection { offer: Option<OfferId> },
    /// The host destroyed the data device.
    Finished,
    /// The host wants the contents of one of our sources.
    SourceSend { source: SourceId, mime_type: String, fd: OwnedFd },
    /// One of our sources was replaced on the host.
    SourceCancelled { source: SourceId },
}

/// Guest-facing view of an inbound source, installed on the guest seat.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostSelection {
    pub offer: OfferId,
    pub mime_types: Vec<String>,
}

/// A guest-owned selection source as reported by the guest seat.
#[derive(Debug, Clone, Copy)]
pub struct GuestSelection<'a> {
    pub source: GuestSourceId,
    pub mime_types: &'a [String],
}

/// Host offer wrapped as a selection source for the guest.
#[derive(Debug)]
struct InboundSource {
    offer: OfferId,
    mime_types: Vec<String>,
}

impl InboundSource {
    fn new(offer: OfferId) -> Self {
        Self {
            offer,
            mime_types: Vec::new(),
        }
    }

    fn selection(&self) -> HostSelection {
        HostSelection {
            offer: self.offer,
            mime_types: self.mime_types.clone(),
        }
    }
}

/// Guest source mirrored on the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct OutboundSource {
    guest: GuestSourceId,
    remote: SourceId,
}

// ============================================================================
// Bridge
// ============================================================================

/// Bidirectional selection mirror.
///
/// Owns every host object it touches: the outbound host source, inbound
/// offers (pending, active, primary) and the discarded echo offer. Each host
/// offer sits in exactly one of those slots, so it is released exactly once.
#[derive(Debug)]
pub struct ClipboardBridge {
    /// Guest selection currently mirrored on the host
    outbound: Option<OutboundSource>,
    /// Offers introduced by the host but not selected yet
    pending: HashMap<OfferId, InboundSource>,
    /// Inbound source installed on the guest seat
    active: Option<InboundSource>,
    /// Host primary selection (kept, not forwarded)
    primary: Option<OfferId>,
    /// Echo of our own selection, released on the next selection event
    discarded: Option<OfferId>,
    suppress_remote_selection: bool,
    finished: bool,
}

impl ClipboardBridge {
    /// Open the mirrored data device on the host.
    ///
    /// Returns `None` when the host has no data-control support; clipboard
    /// mirroring is then disabled.
    pub fn new<H: ClipboardHost>(host: &mut H) -> Option<Self> {
        if !host.supports_data_control() {
            tracing::error!(target: CLIPBOARD, "zwlr_data_control_manager_v1 not available");
            return None;
        }

        if !host.open_data_device() {
            tracing::error!(target: CLIPBOARD, "Could not open host data-control device");
            return None;
        }

        tracing::info!(target: CLIPBOARD, "Clipboard bridge ready");
        Some(Self {
            outbound: None,
            pending: HashMap::new(),
            active: None,
            primary: None,
            discarded: None,
            suppress_remote_selection: false,
            finished: false,
        })
    }

    /// Whether the host tore down the data device. The owner must then
    /// call [`ClipboardBridge::teardown`] and drop the bridge.
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn is_suppressing(&self) -> bool {
        self.suppress_remote_selection
    }

    pub fn outbound_source(&self) -> Option<SourceId> {
        self.outbound.map(|o| o.remote)
    }

    pub fn active_offer(&self) -> Option<OfferId> {
        self.active.as_ref().map(|s| s.offer)
    }

    pub fn discarded_offer(&self) -> Option<OfferId> {
        self.discarded
    }

    pub fn primary_offer(&self) -> Option<OfferId> {
        self.primary
    }

    pub fn pending_offers(&self) -> usize {
        self.pending.len()
    }

    // =========================================================================
    // Guest → host
    // =========================================================================

    /// A guest client changed the seat selection.
    ///
    /// Whatever the seat held before is gone: a host-backed selection is
    /// released and the previously mirrored guest source is retired. A new
    /// guest source is then mirrored on the host.
    pub fn handle_guest_selection<H, S>(
        &mut self,
        host: &mut H,
        seat: &mut S,
        selection: Option<GuestSelection<'_>>,
    ) where
        H: ClipboardHost,
        S: GuestSeat,
    {
        if self.finished {
            return;
        }

        self.release_active(host);
        self.retire_outbound(host);

        let Some(selection) = selection else {
            return;
        };

        let Some(remote) = host.create_source() else {
            tracing::error!(target: CLIPBOARD, "Failed to create host data source");
            return;
        };

        for mime_type in selection.mime_types {
            tracing::debug!(target: CLIPBOARD, "sending mime type: {}", mime_type);
            host.offer(remote, mime_type);
        }
        host.set_selection(remote);

        self.outbound = Some(OutboundSource {
            guest: selection.source,
            remote,
        });

        // Drain the host's echo of the selection we just set
        self.with_remote_selection_suppressed(|bridge| {
            for event in host.roundtrip() {
                bridge.handle_host_event(host, seat, event);
            }
        });
    }

    /// Apply host clipboard events dispatched earlier in this cycle.
    ///
    /// Must run before a guest selection change is applied to the seat, so
    /// an older host selection cannot replace the newer guest one.
    pub fn apply_queued<H, S>(&mut self, host: &mut H, seat: &mut S)
    where
        H: ClipboardHost,
        S: GuestSeat,
    {
        for event in host.take_queued() {
            self.handle_host_event(host, seat, event);
        }
    }

    /// A guest `wl_data_source` was destroyed.
    pub fn handle_guest_source_destroyed<H: ClipboardHost>(&mut self, host: &mut H, source: GuestSourceId) {
        if self.outbound.is_some_and(|o| o.guest == source) {
            tracing::debug!(target: CLIPBOARD, "Guest source {:?} destroyed, dropping host mirror", source);
            self.retire_outbound(host);
        }
    }

    // =========================================================================
    // Host → guest
    // =========================================================================

    /// Apply one host clipboard event.
    pub fn handle_host_event<H, S>(&mut self, host: &mut H, seat: &mut S, event: ClipboardEvent)
    where
        H: ClipboardHost,
        S: GuestSeat,
    {
        if self.finished {
            return;
        }

        match event {
            ClipboardEvent::DataOffer { offer } => {
                self.pending.insert(offer, InboundSource::new(offer));
            }
            ClipboardEvent::OfferMimeType { offer, mime_type } => {
                if let Some(source) = self.pending.get_mut(&offer) {
                    source.mime_types.push(mime_type);
                } else if let Some(source) = self.active.as_mut().filter(|s| s.offer == offer) {
                    source.mime_types.push(mime_type);
                } else {
                    tracing::debug!(target: CLIPBOARD, "MIME type {} for untracked offer {:?}", mime_type, offer);
                }
            }
            ClipboardEvent::Selection { offer } => {
                self.handle_remote_selection(host, seat, offer);
            }
            ClipboardEvent::PrimarySelection { offer } => {
                if let Some(previous) = self.primary.take() {
                    host.destroy_offer(previous);
                }
                if let Some(offer) = offer {
                    self.pending.remove(&offer);
                    self.primary = Some(offer);
                }
            }
            ClipboardEvent::Finished => {
                tracing::error!(target: CLIPBOARD, "remote zwlr_data_control_device_v1 disappeared");
                self.finished = true;
            }
            ClipboardEvent::SourceSend { source, mime_type, fd } => match self.outbound {
                Some(outbound) if outbound.remote == source => {
                    seat.send_client_selection(outbound.guest, &mime_type, fd);
                }
                _ => {
                    tracing::debug!(target: CLIPBOARD, "Send request for retired source {:?}", source);
                }
            },
            ClipboardEvent::SourceCancelled { .. } => {
                // The guest seat owns the lifetime of the mirrored source
            }
        }
    }

    fn handle_remote_selection<H, S>(&mut self, host: &mut H, seat: &mut S, offer: Option<OfferId>)
    where
        H: ClipboardHost,
        S: GuestSeat,
    {
        if let Some(discarded) = self.discarded.take() {
            host.destroy_offer(discarded);
        }

        // A cleared host selection leaves the guest selection alone
        let Some(offer) = offer else {
            return;
        };

        if self.suppress_remote_selection {
            self.pending.remove(&offer);
            self.discarded = Some(offer);
            return;
        }

        let Some(source) = self.pending.remove(&offer) else {
            if self.active_offer() != Some(offer) {
                tracing::warn!(target: CLIPBOARD, "Selection names unknown offer {:?}, releasing it", offer);
                host.destroy_offer(offer);
            }
            return;
        };

        self.release_active(host);
        self.retire_outbound(host);

        let serial = seat.next_serial();
        tracing::debug!(
            target: CLIPBOARD,
            "Installing host selection {:?} ({} MIME types, serial {})",
            offer,
            source.mime_types.len(),
            serial
        );
        seat.set_host_selection(Some(source.selection()), serial);
        self.active = Some(source);
    }

    /// A guest client reads the host-backed selection.
    ///
    /// The descriptor is closed once the request has been flushed to the
    /// host, whatever happens.
    pub fn send_inbound<H: ClipboardHost>(&mut self, host: &mut H, offer: OfferId, mime_type: &str, fd: OwnedFd) {
        if self.active_offer() != Some(offer) {
            tracing::debug!(target: CLIPBOARD, "Read of stale host offer {:?}", offer);
            return;
        }

        host.receive(offer, mime_type, fd.as_fd());
        host.flush();
        drop(fd);
    }

    // =========================================================================
    // Lifetime
    // =========================================================================

    /// Release every host object held by the bridge.
    pub fn teardown<H, S>(mut self, host: &mut H, seat: &mut S)
    where
        H: ClipboardHost,
        S: GuestSeat,
    {
        if let Some(offer) = self.discarded.take() {
            host.destroy_offer(offer);
        }
        if let Some(offer) = self.primary.take() {
            host.destroy_offer(offer);
        }
        if let Some(source) = self.active.take() {
            host.destroy_offer(source.offer);
            let serial = seat.next_serial();
            seat.set_host_selection(None, serial);
        }
        for (offer, _) in self.pending.drain() {
            host.destroy_offer(offer);
        }
        self.retire_outbound(host);
        host.close_data_device();
        host.flush();

        tracing::info!(target: CLIPBOARD, "Clipboard bridge torn down");
    }

    fn with_remote_selection_suppressed<R>(&mut self, f: impl FnOnce(&mut Self) -> R) -> R {
        self.suppress_remote_selection = true;
        let result = f(self);
        self.suppress_remote_selection = false;
        result
    }

    fn release_active<H: ClipboardHost>(&mut self, host: &mut H) {
        if let Some(source) = self.active.take() {
            host.destroy_offer(source.offer);
        }
    }

    fn retire_outbound<H: ClipboardHost>(&mut self, host: &mut H) {
        if let Some(outbound) = self.outbound.take() {
            host.destroy_source(outbound.remote);
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::bridge::mock::{HostCall, MockHost, MockSeat};
    use std::io::{Read, Write};
    use std::os::unix::net::UnixStream;

    fn bridge(host: &mut MockHost) -> ClipboardBridge {
        ClipboardBridge::new(host).expect("bridge")
    }

    fn guest(id: u32, mime_types: &[String]) -> Option<GuestSelection<'_>> {
        Some(GuestSelection {
            source: GuestSourceId(id),
            mime_types,
        })
    }

    fn mimes(list: &[&str]) -> Vec<String> {
        list.iter().map(|m| m.to_string()).collect()
    }

    fn feed(bridge: &mut ClipboardBridge, host: &mut MockHost, seat: &mut MockSeat, events: Vec<ClipboardEvent>) {
        for event in events {
            bridge.handle_host_event(host, seat, event);
        }
    }

    #[test]
    fn test_missing_data_control_disables_bridge() {
        let mut host = MockHost::default();
        host.data_control = false;
        assert!(ClipboardBridge::new(&mut host).is_none());
        assert!(host.calls.is_empty());
    }

    #[test]
    fn test_missing_seat_disables_bridge() {
        let mut host = MockHost::default();
        host.seat = false;
        assert!(ClipboardBridge::new(&mut host).is_none());
    }

    #[test]
    fn test_outbound_offers_mime_types_in_order() {
        let mut host = MockHost::default();
        let mut seat = MockSeat::default();
        let mut bridge = bridge(&mut host);
        let types = mimes(&["text/plain", "text/uri-list"]);

        bridge.handle_guest_selection(&mut host, &mut seat, guest(1, &types));

        let source = bridge.outbound_source().expect("outbound source");
        assert_eq!(
            host.calls_after_open(),
            vec![
                HostCall::CreateSource(source),
                HostCall::Offer(source, "text/plain".into()),
                HostCall::Offer(source, "text/uri-list".into()),
                HostCall::SetSelection(source),
                HostCall::Roundtrip,
            ]
        );
        assert!(!bridge.is_suppressing());
    }

    #[test]
    fn test_host_read_pipes_to_guest_source() {
        let mut host = MockHost::default();
        let mut seat = MockSeat::default();
        let mut bridge = bridge(&mut host);
        let types = mimes(&["text/plain", "text/uri-list"]);
        bridge.handle_guest_selection(&mut host, &mut seat, guest(7, &types));
        let source = bridge.outbound_source().unwrap();

        let (mut reader, writer) = UnixStream::pair().unwrap();
        bridge.handle_host_event(
            &mut host,
            &mut seat,
            ClipboardEvent::SourceSend {
                source,
                mime_type: "text/plain".into(),
                fd: OwnedFd::from(writer),
            },
        );

        let (guest_source, mime_type, fd) = seat.sends.pop().expect("send forwarded");
        assert_eq!(guest_source, GuestSourceId(7));
        assert_eq!(mime_type, "text/plain");

        // The guest client writes and closes; the host side sees the bytes then EOF
        let mut client_end = UnixStream::from(fd);
        client_end.write_all(b"hello").unwrap();
        drop(client_end);

        let mut received = Vec::new();
        reader.read_to_end(&mut received).unwrap();
        assert_eq!(received, b"hello");
    }

    #[test]
    fn test_echo_is_discarded_not_installed() {
        let mut host = MockHost::default();
        host.echo_selection = true;
        let mut seat = MockSeat::default();
        let mut bridge = bridge(&mut host);
        let types = mimes(&["text/plain"]);

        bridge.handle_guest_selection(&mut host, &mut seat, guest(1, &types));

        assert!(seat.installs.is_empty(), "echo reached the guest seat");
        assert!(bridge.discarded_offer().is_some());
        assert!(bridge.active_offer().is_none());
        assert!(bridge.outbound_source().is_some());
        assert_eq!(bridge.pending_offers(), 0);
        assert!(!bridge.is_suppressing());
    }

    #[test]
    fn test_discarded_offer_released_once_on_next_selection() {
        let mut host = MockHost::default();
        host.echo_selection = true;
        let mut seat = MockSeat::default();
        let mut bridge = bridge(&mut host);
        let types = mimes(&["text/plain"]);
        bridge.handle_guest_selection(&mut host, &mut seat, guest(1, &types));
        let echoed = bridge.discarded_offer().unwrap();

        feed(&mut bridge, &mut host, &mut seat, vec![ClipboardEvent::Selection { offer: None }]);
        assert_eq!(host.destroyed_offers(), vec![echoed]);
        assert!(bridge.discarded_offer().is_none());

        // A later selection must not release it again
        feed(&mut bridge, &mut host, &mut seat, vec![ClipboardEvent::Selection { offer: None }]);
        assert_eq!(host.destroyed_offers(), vec![echoed]);
    }

    #[test]
    fn test_discarded_offer_released_on_teardown() {
        let mut host = MockHost::default();
        host.echo_selection = true;
        let mut seat = MockSeat::default();
        let mut bridge = bridge(&mut host);
        let types = mimes(&["text/plain"]);
        bridge.handle_guest_selection(&mut host, &mut seat, guest(1, &types));
        let echoed = bridge.discarded_offer().unwrap();

        bridge.teardown(&mut host, &mut seat);
        assert_eq!(host.destroyed_offers(), vec![echoed]);
        assert!(host.live_offers.is_empty());
        assert!(host.live_sources.is_empty());
        assert!(host.calls.contains(&HostCall::CloseDevice));
    }

    #[test]
    fn test_inbound_selection_installs_wrapper() {
        let mut host = MockHost::default();
        let mut seat = MockSeat::default();
        let mut bridge = bridge(&mut host);

        let (offer, events) = host.advertise(&["image/png"]);
        feed(&mut bridge, &mut host, &mut seat, events);
        feed(&mut bridge, &mut host, &mut seat, vec![ClipboardEvent::Selection { offer: Some(offer) }]);

        let selection = seat.selection.clone().expect("guest selection");
        assert_eq!(selection.offer, offer);
        assert_eq!(selection.mime_types, mimes(&["image/png"]));
        assert_eq!(bridge.active_offer(), Some(offer));
        assert_eq!(seat.installs.len(), 1);
    }

    #[test]
    fn test_inbound_serials_increase() {
        let mut host = MockHost::default();
        let mut seat = MockSeat::default();
        let mut bridge = bridge(&mut host);

        for _ in 0..3 {
            let (offer, events) = host.advertise(&["text/plain"]);
            feed(&mut bridge, &mut host, &mut seat, events);
            feed(&mut bridge, &mut host, &mut seat, vec![ClipboardEvent::Selection { offer: Some(offer) }]);
        }

        let serials: Vec<u32> = seat.installs.iter().map(|(_, serial)| *serial).collect();
        assert!(serials.windows(2).all(|w| w[0] < w[1]), "serials {:?}", serials);
    }

    #[test]
    fn test_replacing_inbound_destroys_exactly_previous() {
        let mut host = MockHost::default();
        let mut seat = MockSeat::default();
        let mut bridge = bridge(&mut host);

        let (first, events) = host.advertise(&["text/plain"]);
        feed(&mut bridge, &mut host, &mut seat, events);
        feed(&mut bridge, &mut host, &mut seat, vec![ClipboardEvent::Selection { offer: Some(first) }]);
        assert!(host.destroyed_offers().is_empty());

        let (second, events) = host.advertise(&["text/html"]);
        feed(&mut bridge, &mut host, &mut seat, events);
        feed(&mut bridge, &mut host, &mut seat, vec![ClipboardEvent::Selection { offer: Some(second) }]);

        assert_eq!(host.destroyed_offers(), vec![first]);
        assert_eq!(bridge.active_offer(), Some(second));
        assert_eq!(host.live_offers.len(), 1);
    }

    #[test]
    fn test_replacing_outbound_destroys_exactly_previous() {
        let mut host = MockHost::default();
        let mut seat = MockSeat::default();
        let mut bridge = bridge(&mut host);
        let types = mimes(&["text/plain"]);

        bridge.handle_guest_selection(&mut host, &mut seat, guest(1, &types));
        let first = bridge.outbound_source().unwrap();
        bridge.handle_guest_selection(&mut host, &mut seat, guest(2, &types));
        let second = bridge.outbound_source().unwrap();

        assert_ne!(first, second);
        assert_eq!(host.destroyed_sources(), vec![first]);
        assert_eq!(host.live_sources.len(), 1);
    }

    #[test]
    fn test_at_most_one_selection_per_direction() {
        let mut host = MockHost::default();
        host.echo_selection = true;
        let mut seat = MockSeat::default();
        let mut bridge = bridge(&mut host);
        let types = mimes(&["text/plain"]);

        for round in 0..4u32 {
            bridge.handle_guest_selection(&mut host, &mut seat, guest(round, &types));
            assert!(host.live_sources.len() <= 1);

            let (offer, events) = host.advertise(&["text/plain"]);
            feed(&mut bridge, &mut host, &mut seat, events);
            feed(&mut bridge, &mut host, &mut seat, vec![ClipboardEvent::Selection { offer: Some(offer) }]);

            // Inbound replaced the guest selection, so its mirror is retired
            assert!(host.live_sources.is_empty());
            assert_eq!(host.live_offers.len(), 1);
            assert_eq!(bridge.active_offer(), Some(offer));
        }
    }

    #[test]
    fn test_guest_selection_releases_active_inbound() {
        let mut host = MockHost::default();
        let mut seat = MockSeat::default();
        let mut bridge = bridge(&mut host);

        let (offer, events) = host.advertise(&["text/plain"]);
        feed(&mut bridge, &mut host, &mut seat, events);
        feed(&mut bridge, &mut host, &mut seat, vec![ClipboardEvent::Selection { offer: Some(offer) }]);

        bridge.handle_guest_selection(&mut host, &mut seat, None);
        assert_eq!(host.destroyed_offers(), vec![offer]);
        assert!(bridge.active_offer().is_none());
        assert!(bridge.outbound_source().is_none());
    }

    #[test]
    fn test_guest_source_destroy_retires_mirror() {
        let mut host = MockHost::default();
        let mut seat = MockSeat::default();
        let mut bridge = bridge(&mut host);
        let types = mimes(&["text/plain"]);
        bridge.handle_guest_selection(&mut host, &mut seat, guest(3, &types));
        let source = bridge.outbound_source().unwrap();

        bridge.handle_guest_source_destroyed(&mut host, GuestSourceId(99));
        assert!(host.destroyed_sources().is_empty());

        bridge.handle_guest_source_destroyed(&mut host, GuestSourceId(3));
        assert_eq!(host.destroyed_sources(), vec![source]);
        assert!(bridge.outbound_source().is_none());
    }

    #[test]
    fn test_cancelled_source_is_not_destroyed() {
        let mut host = MockHost::default();
        let mut seat = MockSeat::default();
        let mut bridge = bridge(&mut host);
        let types = mimes(&["text/plain"]);
        bridge.handle_guest_selection(&mut host, &mut seat, guest(1, &types));
        let source = bridge.outbound_source().unwrap();

        feed(&mut bridge, &mut host, &mut seat, vec![ClipboardEvent::SourceCancelled { source }]);
        assert!(host.destroyed_sources().is_empty());
        assert_eq!(bridge.outbound_source(), Some(source));
    }

    #[test]
    fn test_send_for_retired_source_closes_fd() {
        let mut host = MockHost::default();
        let mut seat = MockSeat::default();
        let mut bridge = bridge(&mut host);

        let (mut reader, writer) = UnixStream::pair().unwrap();
        feed(
            &mut bridge,
            &mut host,
            &mut seat,
            vec![ClipboardEvent::SourceSend {
                source: SourceId(404),
                mime_type: "text/plain".into(),
                fd: OwnedFd::from(writer),
            }],
        );
        assert!(seat.sends.is_empty());

        let mut received = Vec::new();
        reader.read_to_end(&mut received).unwrap();
        assert!(received.is_empty());
    }

    #[test]
    fn test_guest_read_of_host_selection() {
        let mut host = MockHost::default();
        let mut seat = MockSeat::default();
        let mut bridge = bridge(&mut host);
        let (offer, events) = host.advertise(&["image/png"]);
        feed(&mut bridge, &mut host, &mut seat, events);
        feed(&mut bridge, &mut host, &mut seat, vec![ClipboardEvent::Selection { offer: Some(offer) }]);

        let (_reader, writer) = UnixStream::pair().unwrap();
        bridge.send_inbound(&mut host, offer, "image/png", OwnedFd::from(writer));

        let tail: Vec<_> = host.calls.iter().rev().take(2).cloned().collect();
        assert_eq!(tail, vec![HostCall::Flush, HostCall::Receive(offer, "image/png".into())]);
    }

    #[test]
    fn test_guest_read_of_stale_offer_skips_host() {
        let mut host = MockHost::default();
        let mut bridge = bridge(&mut host);

        let (_reader, writer) = UnixStream::pair().unwrap();
        bridge.send_inbound(&mut host, OfferId(12), "text/plain", OwnedFd::from(writer));
        assert!(!host.calls.iter().any(|c| matches!(c, HostCall::Receive(..))));
    }

    #[test]
    fn test_null_selection_keeps_guest_selection() {
        let mut host = MockHost::default();
        let mut seat = MockSeat::default();
        let mut bridge = bridge(&mut host);
        let (offer, events) = host.advertise(&["text/plain"]);
        feed(&mut bridge, &mut host, &mut seat, events);
        feed(&mut bridge, &mut host, &mut seat, vec![ClipboardEvent::Selection { offer: Some(offer) }]);

        feed(&mut bridge, &mut host, &mut seat, vec![ClipboardEvent::Selection { offer: None }]);
        assert_eq!(seat.installs.len(), 1);
        assert_eq!(bridge.active_offer(), Some(offer));
    }

    #[test]
    fn test_primary_selection_is_stored_only() {
        let mut host = MockHost::default();
        let mut seat = MockSeat::default();
        let mut bridge = bridge(&mut host);

        let (first, events) = host.advertise(&["text/plain"]);
        feed(&mut bridge, &mut host, &mut seat, events);
        feed(&mut bridge, &mut host, &mut seat, vec![ClipboardEvent::PrimarySelection { offer: Some(first) }]);
        assert_eq!(bridge.primary_offer(), Some(first));
        assert!(seat.installs.is_empty());

        let (second, events) = host.advertise(&["text/plain"]);
        feed(&mut bridge, &mut host, &mut seat, events);
        feed(&mut bridge, &mut host, &mut seat, vec![ClipboardEvent::PrimarySelection { offer: Some(second) }]);
        assert_eq!(host.destroyed_offers(), vec![first]);

        feed(&mut bridge, &mut host, &mut seat, vec![ClipboardEvent::PrimarySelection { offer: None }]);
        assert_eq!(host.destroyed_offers(), vec![first, second]);
        assert!(bridge.primary_offer().is_none());
    }

    #[test]
    fn test_finished_stops_bridging() {
        let mut host = MockHost::default();
        let mut seat = MockSeat::default();
        let mut bridge = bridge(&mut host);
        let (offer, events) = host.advertise(&["text/plain"]);
        feed(&mut bridge, &mut host, &mut seat, events);
        feed(&mut bridge, &mut host, &mut seat, vec![ClipboardEvent::Selection { offer: Some(offer) }]);

        feed(&mut bridge, &mut host, &mut seat, vec![ClipboardEvent::Finished]);
        assert!(bridge.is_finished());

        let types = mimes(&["text/plain"]);
        let calls_before = host.calls.len();
        bridge.handle_guest_selection(&mut host, &mut seat, guest(1, &types));
        assert_eq!(host.calls.len(), calls_before);

        bridge.teardown(&mut host, &mut seat);
        assert!(host.live_offers.is_empty());
        assert_eq!(seat.selection, None);
    }

    #[test]
    fn test_finished_during_roundtrip() {
        let mut host = MockHost::default();
        let mut seat = MockSeat::default();
        let mut bridge = bridge(&mut host);
        host.roundtrip_events.push_back(ClipboardEvent::Finished);
        let types = mimes(&["text/plain"]);

        bridge.handle_guest_selection(&mut host, &mut seat, guest(1, &types));
        assert!(bridge.is_finished());
        assert!(!bridge.is_suppressing());

        bridge.teardown(&mut host, &mut seat);
        assert!(host.live_sources.is_empty());
    }

    #[test]
    fn test_unknown_offer_selection_is_released() {
        let mut host = MockHost::default();
        let mut seat = MockSeat::default();
        let mut bridge = bridge(&mut host);
        let offer = host.orphan_offer();

        feed(&mut bridge, &mut host, &mut seat, vec![ClipboardEvent::Selection { offer: Some(offer) }]);
        assert!(seat.installs.is_empty());
        assert_eq!(host.destroyed_offers(), vec![offer]);
    }

    #[test]
    fn test_apply_queued_installs_host_selection() {
        let mut host = MockHost::default();
        let mut seat = MockSeat::default();
        let mut bridge = bridge(&mut host);

        let (offer, events) = host.advertise(&["text/plain"]);
        host.queued.extend(events);
        host.queued.push_back(ClipboardEvent::Selection { offer: Some(offer) });

        bridge.apply_queued(&mut host, &mut seat);
        assert!(host.queued.is_empty());
        assert_eq!(bridge.active_offer(), Some(offer));
        assert_eq!(seat.installs.len(), 1);
    }

    #[test]
    fn test_queued_host_selection_does_not_retire_newer_guest_copy() {
        let mut host = MockHost::default();
        host.echo_selection = true;
        let mut seat = MockSeat::default();
        let mut bridge = bridge(&mut host);
        let types = mimes(&["text/plain"]);

        let (stale, events) = host.advertise(&["text/plain"]);
        host.queued.extend(events);
        host.queued.push_back(ClipboardEvent::Selection { offer: Some(stale) });

        bridge.apply_queued(&mut host, &mut seat);
        bridge.handle_guest_selection(&mut host, &mut seat, guest(1, &types));
        let outbound = bridge.outbound_source().expect("outbound");

        // Nothing is left for the main loop to replay
        let leftover = host.take_queued();
        feed(&mut bridge, &mut host, &mut seat, leftover);

        assert_eq!(bridge.outbound_source(), Some(outbound));
        assert!(host.live_sources.contains(&outbound));
        assert_eq!(bridge.active_offer(), None);
        assert!(!host.live_offers.contains(&stale));
    }

    #[test]
    fn test_roundtrip_suppresses_selection_queued_before_it() {
        let mut host = MockHost::default();
        host.echo_selection = true;
        let mut seat = MockSeat::default();
        let mut bridge = bridge(&mut host);
        let types = mimes(&["text/plain"]);

        let (stale, events) = host.advertise(&["text/plain"]);
        host.queued.extend(events);
        host.queued.push_back(ClipboardEvent::Selection { offer: Some(stale) });

        bridge.handle_guest_selection(&mut host, &mut seat, guest(1, &types));

        let outbound = bridge.outbound_source().expect("outbound");
        assert!(host.live_sources.contains(&outbound));
        assert!(host.queued.is_empty());
        assert!(seat.installs.is_empty());
        assert!(!host.live_offers.contains(&stale));
        assert!(bridge.discarded_offer().is_some_and(|d| d != stale));
    }
}

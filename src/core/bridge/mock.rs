//! In-memory collaborators for bridge tests.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet, VecDeque};
use std::os::unix::io::{BorrowedFd, OwnedFd};
use std::rc::Rc;

use super::{
    ClipboardEvent, ClipboardHost, ConstraintHost, ConstraintLifetime, GuestConstraint, GuestSeat,
    GuestSourceId, HostConstraintId, HostSelection, HostSurfaceId, OfferId, OutputLayout, SourceId,
};

/// One request issued against the mock host.
#[derive(Debug, Clone, PartialEq)]
pub enum HostCall {
    OpenDevice,
    CloseDevice,
    CreateSource(SourceId),
    Offer(SourceId, String),
    SetSelection(SourceId),
    DestroySource(SourceId),
    Receive(OfferId, String),
    DestroyOffer(OfferId),
    Flush,
    Roundtrip,
    Lock(HostSurfaceId, ConstraintLifetime, HostConstraintId),
    Confine(HostSurfaceId, ConstraintLifetime, HostConstraintId),
    CursorHint(HostConstraintId, f64, f64),
    DestroyConstraint(HostConstraintId),
}

/// Host connection double.
///
/// Panics when an offer or source is released twice, so ownership bugs
/// surface as test failures.
#[derive(Debug)]
pub struct MockHost {
    pub data_control: bool,
    pub seat: bool,
    pub constraints: bool,
    pub pointer: bool,
    /// Echo every selection we set back as a new host offer
    pub echo_selection: bool,
    pub calls: Vec<HostCall>,
    /// Extra events delivered by the next roundtrip, after any echo
    pub roundtrip_events: VecDeque<ClipboardEvent>,
    /// Events dispatched before the bridge is called, not applied yet
    pub queued: VecDeque<ClipboardEvent>,
    pub live_offers: HashSet<OfferId>,
    pub live_sources: HashSet<SourceId>,
    source_mimes: HashMap<SourceId, Vec<String>>,
    pending_echo: Option<Vec<String>>,
    next_id: u32,
}

impl Default for MockHost {
    fn default() -> Self {
        Self {
            data_control: true,
            seat: true,
            constraints: true,
            pointer: true,
            echo_selection: false,
            calls: Vec::new(),
            roundtrip_events: VecDeque::new(),
            queued: VecDeque::new(),
            live_offers: HashSet::new(),
            live_sources: HashSet::new(),
            source_mimes: HashMap::new(),
            pending_echo: None,
            next_id: 100,
        }
    }
}

impl MockHost {
    fn alloc(&mut self) -> u32 {
        self.next_id += 1;
        self.next_id
    }

    /// Introduce a new host offer; returns the events announcing it.
    pub fn advertise(&mut self, mime_types: &[&str]) -> (OfferId, Vec<ClipboardEvent>) {
        let offer = OfferId(self.alloc());
        self.live_offers.insert(offer);

        let mut events = vec![ClipboardEvent::DataOffer { offer }];
        events.extend(mime_types.iter().map(|m| ClipboardEvent::OfferMimeType {
            offer,
            mime_type: m.to_string(),
        }));
        (offer, events)
    }

    /// A live offer the bridge never heard about.
    pub fn orphan_offer(&mut self) -> OfferId {
        let offer = OfferId(self.alloc());
        self.live_offers.insert(offer);
        offer
    }

    /// Calls recorded after the data device was opened.
    pub fn calls_after_open(&self) -> Vec<HostCall> {
        let start = self
            .calls
            .iter()
            .position(|c| *c == HostCall::OpenDevice)
            .map(|i| i + 1)
            .unwrap_or(0);
        self.calls[start..].to_vec()
    }

    pub fn destroyed_offers(&self) -> Vec<OfferId> {
        self.calls
            .iter()
            .filter_map(|c| match c {
                HostCall::DestroyOffer(offer) => Some(*offer),
                _ => None,
            })
            .collect()
    }

    pub fn destroyed_sources(&self) -> Vec<SourceId> {
        self.calls
            .iter()
            .filter_map(|c| match c {
                HostCall::DestroySource(source) => Some(*source),
                _ => None,
            })
            .collect()
    }
}

impl ClipboardHost for MockHost {
    fn supports_data_control(&self) -> bool {
        self.data_control
    }

    fn open_data_device(&mut self) -> bool {
        if !self.seat {
            return false;
        }
        self.calls.push(HostCall::OpenDevice);
        true
    }

    fn close_data_device(&mut self) {
        self.calls.push(HostCall::CloseDevice);
    }

    fn create_source(&mut self) -> Option<SourceId> {
        let source = SourceId(self.alloc());
        self.live_sources.insert(source);
        self.source_mimes.insert(source, Vec::new());
        self.calls.push(HostCall::CreateSource(source));
        Some(source)
    }

    fn offer(&mut self, source: SourceId, mime_type: &str) {
        self.source_mimes
            .entry(source)
            .or_default()
            .push(mime_type.to_string());
        self.calls.push(HostCall::Offer(source, mime_type.to_string()));
    }

    fn set_selection(&mut self, source: SourceId) {
        if self.echo_selection {
            self.pending_echo = self.source_mimes.get(&source).cloned();
        }
        self.calls.push(HostCall::SetSelection(source));
    }

    fn destroy_source(&mut self, source: SourceId) {
        assert!(self.live_sources.remove(&source), "source {:?} released twice", source);
        self.calls.push(HostCall::DestroySource(source));
    }

    fn receive(&mut self, offer: OfferId, mime_type: &str, _fd: BorrowedFd<'_>) {
        self.calls.push(HostCall::Receive(offer, mime_type.to_string()));
    }

    fn destroy_offer(&mut self, offer: OfferId) {
        assert!(self.live_offers.remove(&offer), "offer {:?} released twice", offer);
        self.calls.push(HostCall::DestroyOffer(offer));
    }

    fn flush(&mut self) {
        self.calls.push(HostCall::Flush);
    }

    fn take_queued(&mut self) -> Vec<ClipboardEvent> {
        self.queued.drain(..).collect()
    }

    fn roundtrip(&mut self) -> Vec<ClipboardEvent> {
        self.calls.push(HostCall::Roundtrip);

        let mut events: Vec<ClipboardEvent> = self.queued.drain(..).collect();
        if let Some(mime_types) = self.pending_echo.take() {
            let refs: Vec<&str> = mime_types.iter().map(String::as_str).collect();
            let (offer, announced) = self.advertise(&refs);
            events.extend(announced);
            events.push(ClipboardEvent::Selection { offer: Some(offer) });
        }
        events.extend(self.roundtrip_events.drain(..));
        events
    }
}

impl ConstraintHost for MockHost {
    fn supports_pointer_constraints(&self) -> bool {
        self.constraints
    }

    fn has_pointer(&self) -> bool {
        self.pointer
    }

    fn lock_pointer(&mut self, surface: HostSurfaceId, lifetime: ConstraintLifetime) -> Option<HostConstraintId> {
        let id = HostConstraintId(self.alloc());
        self.calls.push(HostCall::Lock(surface, lifetime, id));
        Some(id)
    }

    fn confine_pointer(&mut self, surface: HostSurfaceId, lifetime: ConstraintLifetime) -> Option<HostConstraintId> {
        let id = HostConstraintId(self.alloc());
        self.calls.push(HostCall::Confine(surface, lifetime, id));
        Some(id)
    }

    fn set_cursor_position_hint(&mut self, constraint: HostConstraintId, x: f64, y: f64) {
        self.calls.push(HostCall::CursorHint(constraint, x, y));
    }

    fn destroy_constraint(&mut self, constraint: HostConstraintId) {
        self.calls.push(HostCall::DestroyConstraint(constraint));
    }

    fn flush(&mut self) {
        self.calls.push(HostCall::Flush);
    }
}

/// Guest seat double recording installs and forwarded sends.
#[derive(Debug, Default)]
pub struct MockSeat {
    serial: u32,
    /// Guest sources and their MIME types
    pub sources: HashMap<GuestSourceId, Vec<String>>,
    pub client_selection: Option<GuestSourceId>,
    pub selection: Option<HostSelection>,
    pub installs: Vec<(Option<HostSelection>, u32)>,
    pub sends: Vec<(GuestSourceId, String, OwnedFd)>,
}

impl GuestSeat for MockSeat {
    fn next_serial(&mut self) -> u32 {
        self.serial += 1;
        self.serial
    }

    fn set_host_selection(&mut self, selection: Option<HostSelection>, serial: u32) {
        self.client_selection = None;
        self.selection = selection.clone();
        self.installs.push((selection, serial));
    }

    fn send_client_selection(&mut self, source: GuestSourceId, mime_type: &str, fd: OwnedFd) {
        self.sends.push((source, mime_type.to_string(), fd));
    }

    fn select_client_source(&mut self, source: Option<GuestSourceId>) -> bool {
        if source.is_some_and(|id| !self.sources.contains_key(&id)) {
            return false;
        }
        self.selection = None;
        self.client_selection = source;
        true
    }

    fn client_mime_types(&self, source: GuestSourceId) -> Option<Vec<String>> {
        self.sources.get(&source).cloned()
    }
}

/// Output layout double: one entry per active output.
#[derive(Debug, Clone)]
pub struct MockOutputs(pub Vec<Option<HostSurfaceId>>);

impl OutputLayout for MockOutputs {
    fn host_surfaces(&self) -> Vec<Option<HostSurfaceId>> {
        self.0.clone()
    }
}

/// Guest constraint double recording relayed events.
#[derive(Debug, Clone, Default)]
pub struct RecordingConstraint {
    events: Rc<RefCell<Vec<&'static str>>>,
}

impl RecordingConstraint {
    pub fn events(&self) -> Vec<&'static str> {
        self.events.borrow().clone()
    }
}

impl GuestConstraint for RecordingConstraint {
    fn locked(&self) {
        self.events.borrow_mut().push("locked");
    }

    fn unlocked(&self) {
        self.events.borrow_mut().push("unlocked");
    }

    fn confined(&self) {
        self.events.borrow_mut().push("confined");
    }

    fn unconfined(&self) {
        self.events.borrow_mut().push("unconfined");
    }
}

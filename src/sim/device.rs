//! Simulated mesh device.
//!
//! A [`Device`] is a controller handle over a background task that
//! speaks just enough of the attach protocol to exercise a conformance
//! test: a leader answers parent requests and hands out addresses, a
//! candidate router attaches as a child and then promotes itself with a
//! link exchange. Echo request/reply provides the end-to-end
//! reachability probe.
//!
//! ## Attach sequence (candidate router side)
//!
//! 1. multicast Parent Request to all-routers
//! 2. receive Parent Response, unicast Child ID Request to the parent
//! 3. receive Child ID Response, take the assigned short address: child
//! 4. after the router-selection jitter, multicast Link Request
//! 5. receive Link Accept And Request: router, start advertising

use crate::addr::{
    random_mesh_local_eid, DeviceId, ExtAddr, PanId, ShortAddr, ALL_NODES_MULTICAST,
    ALL_ROUTERS_MULTICAST,
};
use crate::config::HarnessConfig;
use crate::mle::{CommandType, MessageMeta, MleMessage};
use crate::sim::frame::{build_frame, frame_payload, EchoPayload, FrameHeader, FrameKind, RadioFrame};
use crate::sim::medium::{FrameRx, Medium, MediumError};
use crate::tlv::{
    Address16Tlv, ChallengeTlv, ConnectivityTlv, LeaderDataTlv, LinkFrameCounterTlv,
    LinkMarginTlv, MleFrameCounterTlv, ModeTlv, NetworkDataTlv, ResponseTlv, Route64Tlv,
    ScanMaskTlv, SourceAddressTlv, StructuredTlv, TimeoutTlv, Tlv, TlvRequestTlv, TlvType,
    VersionTlv,
};
use rand::Rng;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::net::Ipv6Addr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Protocol version advertised by simulated devices.
const PROTOCOL_VERSION: u16 = 2;

/// Default child timeout advertised in Child ID Requests, in seconds.
const CHILD_TIMEOUT_SECS: u32 = 240;

/// Delay between start and the first attach attempt, leaving room for
/// the controller to force a role first.
const ATTACH_DELAY: Duration = Duration::from_millis(300);

/// Resend interval for unanswered attach-phase requests.
const RETRY_INTERVAL: Duration = Duration::from_secs(2);

/// Device task scheduling granularity.
const TICK_INTERVAL: Duration = Duration::from_millis(50);

/// Errors related to device control.
#[derive(Debug, Error)]
pub enum DeviceError {
    #[error("device not started")]
    NotStarted,

    #[error("device already started")]
    AlreadyStarted,

    #[error("medium error: {0}")]
    Medium(#[from] MediumError),
}

/// Mesh role a device currently holds.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Role {
    /// Not attached to any network.
    Detached,
    /// Attached to a parent as an end device.
    Child,
    /// Routing member of the mesh.
    Router,
    /// Topology authority of the partition.
    Leader,
}

impl Role {
    /// Role name as reported by the controller surface.
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Detached => "detached",
            Role::Child => "child",
            Role::Router => "router",
            Role::Leader => "leader",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

enum Command {
    BecomeLeader,
}

/// State shared between the controller handle and the device task.
struct Shared {
    running: bool,
    role: Role,
    pan_id: PanId,
    mode: ModeTlv,
    router_selection_jitter: Duration,
    whitelist: HashSet<[u8; 8]>,
    whitelist_enabled: bool,
    ext_addr: ExtAddr,
    mesh_local_eid: Ipv6Addr,
    short_addr: Option<ShortAddr>,
    ping_waiters: HashMap<u16, oneshot::Sender<()>>,
    next_ping_id: u16,
}

impl Shared {
    fn addresses(&self) -> Vec<Ipv6Addr> {
        let mut addrs = vec![self.ext_addr.link_local()];
        if self.role != Role::Detached {
            addrs.push(self.mesh_local_eid);
            if let Some(short) = self.short_addr {
                addrs.push(short.rloc());
            }
        }
        addrs
    }

    fn accepts_destination(&self, dst: Ipv6Addr) -> bool {
        if dst == ALL_NODES_MULTICAST {
            return true;
        }
        if dst == ALL_ROUTERS_MULTICAST {
            // Router-capable devices listen on all-routers while
            // detached too: parent requests arrive on it.
            return self.mode.device_type;
        }
        self.addresses().contains(&dst)
    }
}

/// Controller handle for a simulated device.
pub struct Device {
    id: DeviceId,
    medium: Arc<Medium>,
    config: HarnessConfig,
    shared: Arc<Mutex<Shared>>,
    cmd_tx: Option<mpsc::Sender<Command>>,
    task: Option<JoinHandle<()>>,
}

impl Device {
    /// Create a device with a random extended address. The device is
    /// configured but not attached to the medium until [`Device::start`].
    pub fn new(id: DeviceId, medium: Arc<Medium>, config: &HarnessConfig) -> Self {
        let shared = Shared {
            running: false,
            role: Role::Detached,
            pan_id: PanId::BROADCAST,
            mode: ModeTlv::from_flags("rsdn"),
            router_selection_jitter: config.router_selection_jitter(),
            whitelist: HashSet::new(),
            whitelist_enabled: false,
            ext_addr: ExtAddr::random(),
            mesh_local_eid: random_mesh_local_eid(),
            short_addr: None,
            ping_waiters: HashMap::new(),
            next_ping_id: 1,
        };
        Self {
            id,
            medium,
            config: config.clone(),
            shared: Arc::new(Mutex::new(shared)),
            cmd_tx: None,
            task: None,
        }
    }

    /// This device's identity on the medium.
    pub fn id(&self) -> DeviceId {
        self.id
    }

    /// The device's extended link-layer address.
    pub fn ext_addr(&self) -> ExtAddr {
        self.lock().ext_addr
    }

    /// Set the PAN this device operates in.
    pub fn set_panid(&self, pan_id: u16) {
        self.lock().pan_id = PanId::new(pan_id);
    }

    /// Set the operating mode from its flag letters (e.g. `"rsdn"`).
    pub fn set_mode(&self, flags: &str) {
        self.lock().mode = ModeTlv::from_flags(flags);
    }

    /// Set the delay between child attach and router promotion.
    pub fn set_router_selection_jitter(&self, jitter: Duration) {
        self.lock().router_selection_jitter = jitter;
    }

    /// Allow frames from the given peer when the whitelist is enabled.
    pub fn add_whitelist(&self, peer: ExtAddr) {
        self.lock().whitelist.insert(*peer.as_bytes());
    }

    /// Enable link-layer whitelist filtering.
    pub fn enable_whitelist(&self) {
        self.lock().whitelist_enabled = true;
    }

    /// Current mesh role.
    pub fn get_state(&self) -> Role {
        self.lock().role
    }

    /// The device's current addresses: link-local always, mesh-local
    /// EID and routing locator once attached.
    pub fn addresses(&self) -> Vec<Ipv6Addr> {
        self.lock().addresses()
    }

    /// Wait until the device reports the given role, bounded by
    /// `timeout`. Returns true on success, false on deadline.
    pub async fn wait_for_state(&self, role: Role, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            if self.get_state() == role {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    }

    /// Attach to the medium and start the device task.
    pub fn start(&mut self) -> Result<(), DeviceError> {
        if self.task.is_some() {
            return Err(DeviceError::AlreadyStarted);
        }
        let rx = self.medium.attach(self.id)?;
        let (cmd_tx, cmd_rx) = mpsc::channel(8);
        self.cmd_tx = Some(cmd_tx);
        self.lock().running = true;

        let core = DeviceCore::new(
            self.id,
            Arc::clone(&self.medium),
            self.config.clone(),
            Arc::clone(&self.shared),
        );
        info!(device = %self.id, "device started");
        self.task = Some(tokio::spawn(core.run(rx, cmd_rx)));
        Ok(())
    }

    /// Stop the device and detach it from the medium.
    pub fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            self.medium.detach(self.id);
            let mut shared = self.lock();
            shared.running = false;
            shared.role = Role::Detached;
            shared.short_addr = None;
            info!(device = %self.id, "device stopped");
        }
        self.cmd_tx = None;
    }

    /// Force this device into the leader role. It allocates a router ID
    /// and partition and starts advertising immediately.
    pub async fn become_leader(&self) -> Result<(), DeviceError> {
        let tx = self.cmd_tx.as_ref().ok_or(DeviceError::NotStarted)?;
        tx.send(Command::BecomeLeader)
            .await
            .map_err(|_| DeviceError::NotStarted)?;
        Ok(())
    }

    /// Probe reachability of an address. True iff an echo reply arrives
    /// within the configured ping timeout.
    pub async fn ping(&self, dst: Ipv6Addr) -> bool {
        let (identifier, rx, frame) = {
            let mut shared = self.lock();
            if !shared.running {
                warn!(device = %self.id, "ping on stopped device");
                return false;
            }
            let identifier = shared.next_ping_id;
            shared.next_ping_id = shared.next_ping_id.wrapping_add(1);
            let (tx, rx) = oneshot::channel();
            shared.ping_waiters.insert(identifier, tx);

            let payload = EchoPayload {
                identifier,
                sequence: 1,
            }
            .encode();
            let frame = build_frame(
                FrameKind::EchoRequest,
                shared.pan_id,
                shared.ext_addr,
                shared.ext_addr.link_local(),
                dst,
                64,
                &payload,
            );
            (identifier, rx, frame)
        };

        self.medium.transmit(self.id, frame).await;

        let replied = tokio::time::timeout(self.config.ping_timeout(), rx)
            .await
            .map(|r| r.is_ok())
            .unwrap_or(false);
        if !replied {
            self.lock().ping_waiters.remove(&identifier);
            debug!(device = %self.id, %dst, "ping timed out");
        }
        replied
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Shared> {
        self.shared.lock().expect("device state lock poisoned")
    }
}

impl Drop for Device {
    fn drop(&mut self) {
        self.stop();
    }
}

// ============================================================================
// Device Task
// ============================================================================

struct ParentInfo {
    /// Parent's link-local address (unicast replies go here).
    src_addr: Ipv6Addr,
    /// Parent's short address from its Parent Response.
    short_addr: ShortAddr,
    /// Challenge the parent asked us to echo in the Child ID Request.
    challenge: Vec<u8>,
}

struct DeviceCore {
    id: DeviceId,
    medium: Arc<Medium>,
    config: HarnessConfig,
    shared: Arc<Mutex<Shared>>,

    // Routing identity (leader or promoted router).
    router_id: Option<u8>,
    id_sequence: u8,
    leader_data: Option<LeaderDataTlv>,
    next_child_id: u16,
    link_frame_counter: u32,
    mle_frame_counter: u32,

    // Attach progress.
    attach_challenge: Option<Vec<u8>>,
    link_challenge: Option<Vec<u8>>,
    parent: Option<ParentInfo>,
    /// Challenges we issued in Parent Responses, keyed by peer.
    issued_challenges: HashMap<[u8; 8], Vec<u8>>,

    // Timers.
    attach_at: Instant,
    promote_at: Option<Instant>,
    last_request_at: Option<Instant>,
    last_advert_at: Option<Instant>,
}

impl DeviceCore {
    fn new(
        id: DeviceId,
        medium: Arc<Medium>,
        config: HarnessConfig,
        shared: Arc<Mutex<Shared>>,
    ) -> Self {
        Self {
            id,
            medium,
            config,
            shared,
            router_id: None,
            id_sequence: 1,
            leader_data: None,
            next_child_id: 1,
            link_frame_counter: 0,
            mle_frame_counter: 0,
            attach_challenge: None,
            link_challenge: None,
            parent: None,
            issued_challenges: HashMap::new(),
            attach_at: Instant::now() + ATTACH_DELAY,
            promote_at: None,
            last_request_at: None,
            last_advert_at: None,
        }
    }

    async fn run(mut self, mut rx: FrameRx, mut cmd_rx: mpsc::Receiver<Command>) {
        let mut tick = tokio::time::interval(TICK_INTERVAL);
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                maybe_frame = rx.recv() => match maybe_frame {
                    Some(frame) => self.handle_frame(frame).await,
                    None => break,
                },
                maybe_cmd = cmd_rx.recv() => match maybe_cmd {
                    Some(Command::BecomeLeader) => self.become_leader().await,
                    None => break,
                },
                _ = tick.tick() => self.on_tick().await,
            }
        }
        debug!(device = %self.id, "device task finished");
    }

    fn role(&self) -> Role {
        self.shared.lock().expect("device state lock poisoned").role
    }

    fn set_role(&self, role: Role) {
        let mut shared = self.shared.lock().expect("device state lock poisoned");
        if shared.role != role {
            info!(device = %self.id, from = %shared.role, to = %role, "role changed");
            shared.role = role;
        }
    }

    fn is_routing(&self) -> bool {
        matches!(self.role(), Role::Router | Role::Leader)
    }

    // ------------------------------------------------------------------
    // Timers
    // ------------------------------------------------------------------

    async fn on_tick(&mut self) {
        let now = Instant::now();

        match self.role() {
            Role::Detached => {
                if now >= self.attach_at && self.due_for_retry(now) {
                    self.send_parent_request().await;
                }
            }
            Role::Child => {
                if let Some(promote_at) = self.promote_at {
                    if now >= promote_at && self.due_for_retry(now) {
                        self.send_link_request().await;
                    }
                }
            }
            Role::Router | Role::Leader => {
                let due = self
                    .last_advert_at
                    .map(|at| now.duration_since(at) >= self.config.advertisement_interval())
                    .unwrap_or(true);
                if due {
                    self.send_advertisement().await;
                    self.last_advert_at = Some(now);
                }
            }
        }
    }

    fn due_for_retry(&self, now: Instant) -> bool {
        self.last_request_at
            .map(|at| now.duration_since(at) >= RETRY_INTERVAL)
            .unwrap_or(true)
    }

    async fn become_leader(&mut self) {
        let router_id;
        {
            let mut rng = rand::thread_rng();
            router_id = rng.gen_range(0..62u8);
            self.id_sequence = rng.gen();
            self.leader_data = Some(LeaderDataTlv {
                partition_id: rng.gen(),
                weighting: 64,
                data_version: rng.gen(),
                stable_data_version: rng.gen(),
                leader_router_id: router_id,
            });
        }
        self.router_id = Some(router_id);
        {
            let mut shared = self.shared.lock().expect("device state lock poisoned");
            shared.short_addr = Some(ShortAddr::new(router_id, 0));
        }
        self.set_role(Role::Leader);
        self.send_advertisement().await;
        self.last_advert_at = Some(Instant::now());
    }

    // ------------------------------------------------------------------
    // Frame handling
    // ------------------------------------------------------------------

    async fn handle_frame(&mut self, frame: RadioFrame) {
        let header = match FrameHeader::parse(&frame.data) {
            Ok(header) => header,
            Err(error) => {
                debug!(device = %self.id, %error, "unparseable frame ignored");
                return;
            }
        };

        // Link-layer filters: whitelist, PAN, destination.
        {
            let shared = self.shared.lock().expect("device state lock poisoned");
            if shared.whitelist_enabled && !shared.whitelist.contains(header.src_ext.as_bytes()) {
                debug!(device = %self.id, peer = %header.src_ext, "frame filtered by whitelist");
                return;
            }
            if header.pan_id != shared.pan_id
                && header.pan_id != PanId::BROADCAST
                && shared.pan_id != PanId::BROADCAST
            {
                return;
            }
            if !shared.accepts_destination(header.dst_addr) {
                return;
            }
        }

        let payload = match frame_payload(&frame.data) {
            Ok(payload) => payload,
            Err(error) => {
                debug!(device = %self.id, %error, "frame payload mismatch ignored");
                return;
            }
        };

        match header.kind() {
            Some(FrameKind::Mle) => self.handle_mle(&header, payload, frame.sender).await,
            Some(FrameKind::EchoRequest) => self.handle_echo_request(&header, payload).await,
            Some(FrameKind::EchoReply) => self.handle_echo_reply(payload),
            None => {}
        }
    }

    async fn handle_mle(&mut self, header: &FrameHeader, payload: &[u8], sender: DeviceId) {
        let meta = MessageMeta {
            src_addr: header.src_addr,
            dst_addr: header.dst_addr,
            hop_limit: header.hop_limit,
            sender,
        };
        let msg = match MleMessage::decode(payload, meta) {
            Ok(msg) => msg,
            Err(error) => {
                warn!(device = %self.id, %error, "malformed mle message ignored");
                return;
            }
        };
        debug!(device = %self.id, command = %msg.command, from = %header.src_ext, "mle message received");

        match msg.command {
            CommandType::ParentRequest if self.is_routing() => {
                self.handle_parent_request(header, &msg).await;
            }
            CommandType::ParentResponse if self.role() == Role::Detached => {
                self.handle_parent_response(header, &msg).await;
            }
            CommandType::ChildIdRequest if self.is_routing() => {
                self.handle_child_id_request(header, &msg).await;
            }
            CommandType::ChildIdResponse if self.role() == Role::Detached => {
                self.handle_child_id_response(&msg);
            }
            CommandType::LinkRequest if self.is_routing() => {
                self.handle_link_request(header, &msg).await;
            }
            CommandType::LinkAcceptAndRequest if self.role() == Role::Child => {
                self.handle_link_accept(&msg);
            }
            _ => {}
        }
    }

    async fn handle_echo_request(&mut self, header: &FrameHeader, payload: &[u8]) {
        let echo = match EchoPayload::decode(payload) {
            Ok(echo) => echo,
            Err(_) => return,
        };
        let (pan_id, ext_addr) = {
            let shared = self.shared.lock().expect("device state lock poisoned");
            (shared.pan_id, shared.ext_addr)
        };
        // Reply from the address that was probed.
        let frame = build_frame(
            FrameKind::EchoReply,
            pan_id,
            ext_addr,
            header.dst_addr,
            header.src_addr,
            64,
            &echo.encode(),
        );
        self.medium.transmit(self.id, frame).await;
    }

    fn handle_echo_reply(&mut self, payload: &[u8]) {
        if let Ok(echo) = EchoPayload::decode(payload) {
            let waiter = {
                let mut shared = self.shared.lock().expect("device state lock poisoned");
                shared.ping_waiters.remove(&echo.identifier)
            };
            if let Some(tx) = waiter {
                let _ = tx.send(());
            }
        }
    }

    // ------------------------------------------------------------------
    // Attach: candidate router side
    // ------------------------------------------------------------------

    async fn send_parent_request(&mut self) {
        let challenge = ChallengeTlv::random();
        self.attach_challenge = Some(challenge.0.clone());
        self.last_request_at = Some(Instant::now());

        let mode = self.shared.lock().expect("device state lock poisoned").mode;
        let tlvs = [
            mode.to_tlv(),
            challenge.to_tlv(),
            // First attach round addresses routers only.
            ScanMaskTlv {
                router: true,
                end_device: false,
            }
            .to_tlv(),
            VersionTlv(PROTOCOL_VERSION).to_tlv(),
        ];
        self.send_mle(ALL_ROUTERS_MULTICAST, CommandType::ParentRequest, &tlvs)
            .await;
    }

    async fn handle_parent_response(&mut self, header: &FrameHeader, msg: &MleMessage) {
        let Some(expected) = self.attach_challenge.as_deref() else {
            return;
        };
        match msg.get_tlv_as::<ResponseTlv>() {
            Ok(Some(response)) if response.0 == expected => {}
            _ => {
                debug!(device = %self.id, "parent response with stale challenge ignored");
                return;
            }
        }
        let (Ok(Some(source)), Ok(Some(challenge))) = (
            msg.get_tlv_as::<SourceAddressTlv>(),
            msg.get_tlv_as::<ChallengeTlv>(),
        ) else {
            warn!(device = %self.id, "parent response missing source or challenge");
            return;
        };
        if let Ok(Some(leader_data)) = msg.get_tlv_as::<LeaderDataTlv>() {
            self.leader_data = Some(leader_data);
        }
        self.parent = Some(ParentInfo {
            src_addr: header.src_addr,
            short_addr: source.0,
            challenge: challenge.0,
        });
        self.send_child_id_request().await;
    }

    async fn send_child_id_request(&mut self) {
        let (dst, parent_short, response) = match &self.parent {
            Some(parent) => (
                parent.src_addr,
                parent.short_addr,
                ResponseTlv(parent.challenge.clone()),
            ),
            None => return,
        };
        debug!(device = %self.id, parent = %parent_short, "requesting child id");
        self.last_request_at = Some(Instant::now());

        let mode = self.shared.lock().expect("device state lock poisoned").mode;
        self.link_frame_counter += 1;
        self.mle_frame_counter += 1;
        let tlvs = [
            response.to_tlv(),
            LinkFrameCounterTlv(self.link_frame_counter).to_tlv(),
            MleFrameCounterTlv(self.mle_frame_counter).to_tlv(),
            mode.to_tlv(),
            TimeoutTlv(CHILD_TIMEOUT_SECS).to_tlv(),
            VersionTlv(PROTOCOL_VERSION).to_tlv(),
            TlvRequestTlv(vec![TlvType::Address16, TlvType::NetworkData, TlvType::Route64])
                .to_tlv(),
            // No address registration: router-capable devices keep their
            // own addresses.
        ];
        self.send_mle(dst, CommandType::ChildIdRequest, &tlvs).await;
    }

    fn handle_child_id_response(&mut self, msg: &MleMessage) {
        let Ok(Some(address)) = msg.get_tlv_as::<Address16Tlv>() else {
            warn!(device = %self.id, "child id response without address ignored");
            return;
        };
        if let Ok(Some(leader_data)) = msg.get_tlv_as::<LeaderDataTlv>() {
            self.leader_data = Some(leader_data);
        }
        let jitter = {
            let mut shared = self.shared.lock().expect("device state lock poisoned");
            shared.short_addr = Some(address.0);
            shared.router_selection_jitter
        };
        self.set_role(Role::Child);
        self.promote_at = Some(Instant::now() + jitter);
        self.last_request_at = None;
    }

    async fn send_link_request(&mut self) {
        let challenge = ChallengeTlv::random();
        self.link_challenge = Some(challenge.0.clone());
        self.last_request_at = Some(Instant::now());

        let short_addr = {
            let shared = self.shared.lock().expect("device state lock poisoned");
            shared.short_addr
        };
        let Some(short_addr) = short_addr else { return };
        let Some(leader_data) = self.leader_data else {
            return;
        };
        let tlvs = [
            SourceAddressTlv(short_addr).to_tlv(),
            leader_data.to_tlv(),
            challenge.to_tlv(),
            VersionTlv(PROTOCOL_VERSION).to_tlv(),
            TlvRequestTlv(vec![TlvType::LinkMargin]).to_tlv(),
        ];
        self.send_mle(ALL_ROUTERS_MULTICAST, CommandType::LinkRequest, &tlvs)
            .await;
    }

    fn handle_link_accept(&mut self, msg: &MleMessage) {
        let Some(expected) = self.link_challenge.as_deref() else {
            return;
        };
        match msg.get_tlv_as::<ResponseTlv>() {
            Ok(Some(response)) if response.0 == expected => {}
            _ => return,
        }

        // Promote: take a router ID distinct from the leader's and move
        // the short address into router space.
        let leader_router_id = self.leader_data.map(|ld| ld.leader_router_id).unwrap_or(0);
        let mut rng = rand::thread_rng();
        let router_id = loop {
            let candidate: u8 = rng.gen_range(0..62);
            if candidate != leader_router_id {
                break candidate;
            }
        };
        self.router_id = Some(router_id);
        {
            let mut shared = self.shared.lock().expect("device state lock poisoned");
            shared.short_addr = Some(ShortAddr::new(router_id, 0));
        }
        self.set_role(Role::Router);
        self.promote_at = None;
        self.last_request_at = None;
    }

    // ------------------------------------------------------------------
    // Attach: parent side
    // ------------------------------------------------------------------

    async fn handle_parent_request(&mut self, header: &FrameHeader, msg: &MleMessage) {
        let Ok(Some(scan_mask)) = msg.get_tlv_as::<ScanMaskTlv>() else {
            warn!(device = %self.id, "parent request without scan mask ignored");
            return;
        };
        let eligible = match self.role() {
            Role::Router | Role::Leader => scan_mask.router,
            _ => false,
        };
        if !eligible {
            return;
        }
        let Ok(Some(challenge)) = msg.get_tlv_as::<ChallengeTlv>() else {
            warn!(device = %self.id, "parent request without challenge ignored");
            return;
        };

        let our_challenge = ChallengeTlv::random();
        self.issued_challenges
            .insert(*header.src_ext.as_bytes(), our_challenge.0.clone());

        let (short_addr, leader_data) = match (self.own_short_addr(), self.leader_data) {
            (Some(s), Some(l)) => (s, l),
            _ => return,
        };
        self.link_frame_counter += 1;
        self.mle_frame_counter += 1;
        let tlvs = [
            SourceAddressTlv(short_addr).to_tlv(),
            leader_data.to_tlv(),
            LinkFrameCounterTlv(self.link_frame_counter).to_tlv(),
            MleFrameCounterTlv(self.mle_frame_counter).to_tlv(),
            ResponseTlv(challenge.0).to_tlv(),
            our_challenge.to_tlv(),
            LinkMarginTlv(self.link_margin()).to_tlv(),
            ConnectivityTlv {
                parent_priority: 0,
                link_quality_3: 1,
                link_quality_2: 0,
                link_quality_1: 0,
                leader_cost: 0,
                id_sequence: self.id_sequence,
                active_routers: 1,
                sed_buffer_size: 1280,
                sed_datagram_count: 1,
            }
            .to_tlv(),
            VersionTlv(PROTOCOL_VERSION).to_tlv(),
        ];
        self.send_mle(header.src_addr, CommandType::ParentResponse, &tlvs)
            .await;
    }

    async fn handle_child_id_request(&mut self, header: &FrameHeader, msg: &MleMessage) {
        let Some(expected) = self.issued_challenges.get(header.src_ext.as_bytes()) else {
            debug!(device = %self.id, peer = %header.src_ext, "child id request from unknown peer");
            return;
        };
        match msg.get_tlv_as::<ResponseTlv>() {
            Ok(Some(response)) if &response.0 == expected => {}
            _ => {
                debug!(device = %self.id, "child id request with stale response ignored");
                return;
            }
        }
        let (router_id, leader_data) = match (self.router_id, self.leader_data) {
            (Some(r), Some(l)) => (r, l),
            _ => return,
        };
        let assigned = ShortAddr::new(router_id, self.next_child_id);
        self.next_child_id += 1;

        let requested = msg
            .get_tlv_as::<TlvRequestTlv>()
            .ok()
            .flatten()
            .unwrap_or_default();

        let mut tlvs = vec![
            SourceAddressTlv(self.own_short_addr().unwrap_or(assigned)).to_tlv(),
            leader_data.to_tlv(),
            Address16Tlv(assigned).to_tlv(),
        ];
        if requested.contains(TlvType::NetworkData) {
            tlvs.push(NetworkDataTlv(vec![0x08, 0x04, 0x0b, 0x02]).to_tlv());
        }
        if requested.contains(TlvType::Route64) {
            tlvs.push(self.route64().to_tlv());
        }
        self.send_mle(header.src_addr, CommandType::ChildIdResponse, &tlvs)
            .await;
    }

    async fn handle_link_request(&mut self, header: &FrameHeader, msg: &MleMessage) {
        let Ok(Some(challenge)) = msg.get_tlv_as::<ChallengeTlv>() else {
            warn!(device = %self.id, "link request without challenge ignored");
            return;
        };
        let (short_addr, leader_data) = match (self.own_short_addr(), self.leader_data) {
            (Some(s), Some(l)) => (s, l),
            _ => return,
        };
        let requested = msg
            .get_tlv_as::<TlvRequestTlv>()
            .ok()
            .flatten()
            .unwrap_or_default();

        let our_challenge = ChallengeTlv::random();
        self.issued_challenges
            .insert(*header.src_ext.as_bytes(), our_challenge.0.clone());

        self.link_frame_counter += 1;
        self.mle_frame_counter += 1;
        let mut tlvs = vec![
            SourceAddressTlv(short_addr).to_tlv(),
            leader_data.to_tlv(),
            ResponseTlv(challenge.0).to_tlv(),
            LinkFrameCounterTlv(self.link_frame_counter).to_tlv(),
            MleFrameCounterTlv(self.mle_frame_counter).to_tlv(),
            VersionTlv(PROTOCOL_VERSION).to_tlv(),
        ];
        if requested.contains(TlvType::LinkMargin) {
            tlvs.push(LinkMarginTlv(self.link_margin()).to_tlv());
        }
        tlvs.push(our_challenge.to_tlv());
        self.send_mle(header.src_addr, CommandType::LinkAcceptAndRequest, &tlvs)
            .await;
    }

    // ------------------------------------------------------------------
    // Advertisement and helpers
    // ------------------------------------------------------------------

    async fn send_advertisement(&mut self) {
        let (short_addr, leader_data) = match (self.own_short_addr(), self.leader_data) {
            (Some(s), Some(l)) => (s, l),
            _ => return,
        };
        let tlvs = [
            SourceAddressTlv(short_addr).to_tlv(),
            leader_data.to_tlv(),
            self.route64().to_tlv(),
        ];
        self.send_mle(ALL_NODES_MULTICAST, CommandType::Advertisement, &tlvs)
            .await;
    }

    fn route64(&self) -> Route64Tlv {
        let mut routers = Vec::new();
        if let Some(own) = self.router_id {
            routers.push(own);
        }
        if let Some(leader) = self.leader_data.map(|ld| ld.leader_router_id) {
            if !routers.contains(&leader) {
                routers.push(leader);
            }
        }
        routers.sort_unstable();
        Route64Tlv::with_routers(self.id_sequence, &routers)
    }

    fn own_short_addr(&self) -> Option<ShortAddr> {
        self.shared
            .lock()
            .expect("device state lock poisoned")
            .short_addr
    }

    fn link_margin(&self) -> u8 {
        // Ideal medium: a fixed, healthy margin.
        20
    }

    async fn send_mle(&mut self, dst: Ipv6Addr, command: CommandType, tlvs: &[Tlv]) {
        let payload = match MleMessage::encode_payload(command, tlvs) {
            Ok(payload) => payload,
            Err(error) => {
                warn!(device = %self.id, %command, %error, "failed to encode mle message");
                return;
            }
        };
        let (pan_id, ext_addr) = {
            let shared = self.shared.lock().expect("device state lock poisoned");
            (shared.pan_id, shared.ext_addr)
        };
        let frame = build_frame(
            FrameKind::Mle,
            pan_id,
            ext_addr,
            ext_addr.link_local(),
            dst,
            255,
            &payload,
        );
        debug!(device = %self.id, %command, %dst, "mle message sent");
        self.medium.transmit(self.id, frame).await;
    }
}

//! Core identifiers and wire-level value types shared by every layer above
//! the frame extractor.
//!
//! Grounded on `custom_components/pytap/pytap/core/types.py` from the
//! reference implementation this crate reimplements natively: the constants,
//! bit layouts and scaling factors below are transcribed from there, not
//! guessed. `PacketType`'s byte codes are transcribed from that file's
//! `PacketType(IntEnum)` even for the variants this crate never dispatches.

use serde::Serialize;

/// Slots per 2-bit rolling epoch.
pub const SLOTS_PER_EPOCH: u32 = 12_000;
/// Highest valid slot number within an epoch.
pub const MAX_SLOT: u16 = 11_999;
/// Nominal duration of one slot.
pub const SLOT_DURATION_MS: i64 = 5;

/// A gateway's 15-bit identifier, carried in the low bits of a link address.
pub type GatewayId = u16;

/// A node's 16-bit address on the mesh. `0` is the broadcast sentinel.
pub type NodeAddress = u16;

/// A non-broadcast [`NodeAddress`]. Constructed only from a nonzero value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct NodeId(u16);

impl NodeId {
    /// Returns `None` for the broadcast address `0`.
    pub fn new(addr: NodeAddress) -> Option<Self> {
        if addr == 0 { None } else { Some(NodeId(addr)) }
    }

    pub fn get(self) -> u16 {
        self.0
    }
}

/// Direction of a link-layer frame, carried as the high bit of the 16-bit
/// link address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Direction {
    HostToGateway,
    GatewayToHost,
}

/// A decoded link address: a 15-bit [`GatewayId`] plus [`Direction`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LinkAddress {
    pub gateway_id: GatewayId,
    pub direction: Direction,
}

impl LinkAddress {
    pub fn from_u16(raw: u16) -> Self {
        let direction = if raw & 0x8000 != 0 {
            Direction::GatewayToHost
        } else {
            Direction::HostToGateway
        };
        LinkAddress {
            gateway_id: raw & 0x7FFF,
            direction,
        }
    }
}

/// An 8-byte IEEE-802.15.4-style MAC address identifying a Tigo node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct LongAddress(pub [u8; 8]);

impl LongAddress {
    /// The organizationally-unique prefix Tigo devices carry.
    pub const TIGO_OUI: [u8; 2] = [0x04, 0xC0];

    pub fn is_tigo(&self) -> bool {
        self.0[0..2] == Self::TIGO_OUI
    }
}

impl std::fmt::Display for LongAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let parts: Vec<String> = self.0.iter().map(|b| format!("{b:02X}")).collect();
        write!(f, "{}", parts.join(":"))
    }
}

impl From<[u8; 8]> for LongAddress {
    fn from(bytes: [u8; 8]) -> Self {
        LongAddress(bytes)
    }
}

/// Parses the colon-hex form [`LongAddress`]'s `Display` impl produces
/// (`"04:C0:5B:30:00:02:BE:16"`), the inverse of that formatting.
impl std::str::FromStr for LongAddress {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut bytes = [0u8; 8];
        let mut parts = s.split(':');
        for slot in bytes.iter_mut() {
            let part = parts.next().ok_or(())?;
            *slot = u8::from_str_radix(part, 16).map_err(|_| ())?;
        }
        if parts.next().is_some() {
            return Err(());
        }
        Ok(LongAddress(bytes))
    }
}

/// A received-signal-strength indicator byte, passed through unscaled.
pub type Rssi = u8;

/// A 16-bit mesh timekeeping value: 2-bit rolling epoch plus 14-bit slot
/// number within that epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SlotCounter {
    pub epoch: u8,
    pub slot_number: u16,
}

impl SlotCounter {
    pub fn from_u16(raw: u16) -> Self {
        SlotCounter {
            epoch: ((raw >> 14) & 0b11) as u8,
            slot_number: raw & 0x3FFF,
        }
    }

    pub fn to_u16(self) -> u16 {
        ((self.epoch as u16 & 0b11) << 14) | (self.slot_number & 0x3FFF)
    }

    /// Number of slots elapsed from `earlier` to `self`, assuming `self` is
    /// at most one 4-epoch ring ahead of `earlier`.
    ///
    /// The epoch delta is always folded forward into `0..4`; the result is
    /// therefore a forward distance, not a symmetric signed delta — a
    /// `self` that is actually *behind* `earlier` by more than one epoch
    /// wraps around and reports a large forward distance instead of a
    /// negative one.
    pub fn slots_since(self, earlier: SlotCounter) -> i64 {
        let epoch_diff = (self.epoch as i64 - earlier.epoch as i64).rem_euclid(4);
        epoch_diff * SLOTS_PER_EPOCH as i64 + (self.slot_number as i64 - earlier.slot_number as i64)
    }
}

/// A sign-extended 12-bit value, used for temperature readings.
pub fn sign_extend_12(raw: u16) -> i16 {
    let raw = raw & 0x0FFF;
    if raw & 0x0800 != 0 {
        (raw as i16) - 0x1000
    } else {
        raw as i16
    }
}

/// Two 12-bit values packed into 3 bytes, the layout [`crate::decoder`] uses
/// to unpack `(voltage_in, voltage_out)` and `(current, temperature)` pairs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct U12Pair {
    pub first: u16,
    pub second: u16,
}

impl U12Pair {
    /// Unpacks `first = (bytes[0] << 4) | (bytes[1] >> 4)` and
    /// `second = ((bytes[1] & 0x0F) << 8) | bytes[2]`.
    pub fn unpack(bytes: [u8; 3]) -> Self {
        let first = ((bytes[0] as u16) << 4) | ((bytes[1] as u16) >> 4);
        let second = (((bytes[1] & 0x0F) as u16) << 8) | bytes[2] as u16;
        U12Pair { first, second }
    }
}

/// The 18 frame types this crate recognizes at the link layer, per the
/// dispatch table grounded on `parser.py::_dispatch_frame`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FrameType {
    PingRequest,
    PingResponse,
    VersionRequest,
    VersionResponse,
    ReceiveRequest,
    ReceiveResponse,
    EnumerationStartRequest,
    EnumerationStartResponse,
    EnumerationEndRequest,
    EnumerationEndResponse,
    EnumerationRequest,
    EnumerationResponse,
    IdentifyRequest,
    IdentifyResponse,
    AssignGatewayIdRequest,
    AssignGatewayIdResponse,
    CommandRequest,
    CommandResponse,
    Unknown(u16),
}

impl FrameType {
    pub fn from_u16(raw: u16) -> Self {
        match raw {
            0x0B00 => FrameType::PingRequest,
            0x0B01 => FrameType::PingResponse,
            0x000A => FrameType::VersionRequest,
            0x000B => FrameType::VersionResponse,
            0x0148 => FrameType::ReceiveRequest,
            0x0149 => FrameType::ReceiveResponse,
            0x0014 => FrameType::EnumerationStartRequest,
            0x0015 => FrameType::EnumerationStartResponse,
            0x0E02 => FrameType::EnumerationEndRequest,
            0x0006 => FrameType::EnumerationEndResponse,
            0x0038 => FrameType::EnumerationRequest,
            0x0039 => FrameType::EnumerationResponse,
            0x003A => FrameType::IdentifyRequest,
            0x003B => FrameType::IdentifyResponse,
            0x003C => FrameType::AssignGatewayIdRequest,
            0x003D => FrameType::AssignGatewayIdResponse,
            0x0B0F => FrameType::CommandRequest,
            0x0B10 => FrameType::CommandResponse,
            other => FrameType::Unknown(other),
        }
    }
}

/// Application-level packet types carried inside a `RECEIVE_RESPONSE` or a
/// command request/response pair. Variants with no handler in
/// [`crate::decoder`] are still named here so matches stay exhaustive as
/// handlers are added.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PacketType {
    PowerReport,
    TopologyReport,
    StringRequest,
    StringResponse,
    NodeTableRequest,
    NodeTableResponse,
    GatewayRadioConfigurationRequest,
    GatewayRadioConfigurationResponse,
    PvConfigurationRequest,
    PvConfigurationResponse,
    Broadcast,
    BroadcastAck,
    LongNetworkStatusRequest,
    NetworkStatusRequest,
    NetworkStatusResponse,
    Unknown(u8),
}

impl PacketType {
    pub fn from_u8(raw: u8) -> Self {
        match raw {
            0x31 => PacketType::PowerReport,
            0x09 => PacketType::TopologyReport,
            0x06 => PacketType::StringRequest,
            0x07 => PacketType::StringResponse,
            0x26 => PacketType::NodeTableRequest,
            0x27 => PacketType::NodeTableResponse,
            0x0D => PacketType::GatewayRadioConfigurationRequest,
            0x0E => PacketType::GatewayRadioConfigurationResponse,
            0x13 => PacketType::PvConfigurationRequest,
            0x18 => PacketType::PvConfigurationResponse,
            0x22 => PacketType::Broadcast,
            0x23 => PacketType::BroadcastAck,
            0x2D => PacketType::LongNetworkStatusRequest,
            0x2E => PacketType::NetworkStatusRequest,
            0x2F => PacketType::NetworkStatusResponse,
            other => PacketType::Unknown(other),
        }
    }
}

/// Header preceding each application packet inside a decoded frame payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReceivedPacketHeader {
    pub packet_type: PacketType,
    pub node_address: NodeAddress,
    pub short_address: u16,
    pub dsn: u8,
    pub data_length: u8,
}

/// Raw, unscaled contents of a 13-byte power-report payload.
///
/// `unknown` carries offsets 7-9, whose semantics are unresolved upstream
/// (see `SPEC_FULL.md` §9); they are stored, never interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PowerReport {
    pub voltage_in_raw: u16,
    pub voltage_out_raw: u16,
    pub current_raw: u16,
    pub temperature_raw: i16,
    pub duty_cycle_raw: u8,
    pub unknown: [u8; 3],
    pub slot: SlotCounter,
    pub rssi: Rssi,
}

impl PowerReport {
    pub fn voltage_in(&self) -> f64 {
        self.voltage_in_raw as f64 / 20.0
    }

    pub fn voltage_out(&self) -> f64 {
        self.voltage_out_raw as f64 / 10.0
    }

    pub fn current_in(&self) -> f64 {
        self.current_raw as f64 / 200.0
    }

    pub fn temperature(&self) -> f64 {
        self.temperature_raw as f64 / 10.0
    }

    pub fn duty_cycle(&self) -> f64 {
        self.duty_cycle_raw as f64 / 255.0
    }
}

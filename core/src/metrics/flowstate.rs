//! Per-period flow lifecycle states.
//!
//! A period's traffic for one stream is summarized as a word over two event
//! letters: `D` (a delimiting flow event) and `P` (at least one packet).
//! Adjacent repeats collapse, so the reachable states are the six short words
//! below plus an error state for transitions that would produce anything
//! longer.

use std::fmt;

use serde::Serialize;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FlowState {
    /// Nothing observed yet.
    #[default]
    Empty,
    /// `D`
    Delim,
    /// `P`
    Packet,
    /// `DP`
    DelimPacket,
    /// `PD`
    PacketDelim,
    /// `DPD`
    DelimPacketDelim,
    Error,
}

impl FlowState {
    /// State after a delimiting flow event.
    pub fn delimited(self) -> FlowState {
        match self {
            FlowState::Empty | FlowState::Delim => FlowState::Delim,
            FlowState::Packet | FlowState::PacketDelim => FlowState::PacketDelim,
            FlowState::DelimPacket | FlowState::DelimPacketDelim => FlowState::DelimPacketDelim,
            FlowState::Error => FlowState::Error,
        }
    }

    /// State after a packet arrival.
    pub fn with_packet(self) -> FlowState {
        match self {
            FlowState::Empty | FlowState::Packet => FlowState::Packet,
            FlowState::Delim | FlowState::DelimPacket => FlowState::DelimPacket,
            _ => FlowState::Error,
        }
    }

    /// State of this period followed by `next`.
    pub fn concat(self, next: FlowState) -> FlowState {
        match next {
            FlowState::Empty => self,
            FlowState::Delim => self.delimited(),
            FlowState::Packet => self.with_packet(),
            FlowState::DelimPacket => self.delimited().with_packet(),
            FlowState::PacketDelim => self.with_packet().delimited(),
            FlowState::DelimPacketDelim => self.delimited().with_packet().delimited(),
            FlowState::Error => FlowState::Error,
        }
    }

    /// True when the period opens with a packet (no leading delimiter).
    pub fn begins_with_packet(self) -> bool {
        matches!(self, FlowState::Packet | FlowState::PacketDelim)
    }

    /// True when the period closes with a packet (no trailing delimiter).
    pub fn ends_with_packet(self) -> bool {
        matches!(self, FlowState::Packet | FlowState::DelimPacket)
    }

    pub fn is_error(self) -> bool {
        self == FlowState::Error
    }
}

impl fmt::Display for FlowState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FlowState::Empty => "-",
            FlowState::Delim => "D",
            FlowState::Packet => "P",
            FlowState::DelimPacket => "DP",
            FlowState::PacketDelim => "PD",
            FlowState::DelimPacketDelim => "DPD",
            FlowState::Error => "ERROR",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::FlowState::*;

    #[test]
    fn core_packet_transitions() {
        assert_eq!(Empty.with_packet(), Packet);
        assert_eq!(Packet.with_packet(), Packet);
        assert_eq!(Delim.with_packet(), DelimPacket);
        assert_eq!(DelimPacket.with_packet(), DelimPacket);
        assert_eq!(PacketDelim.with_packet(), Error);
        assert_eq!(DelimPacketDelim.with_packet(), Error);
    }

    #[test]
    fn core_delimit_transitions() {
        assert_eq!(Empty.delimited(), Delim);
        assert_eq!(Delim.delimited(), Delim);
        assert_eq!(Packet.delimited(), PacketDelim);
        assert_eq!(PacketDelim.delimited(), PacketDelim);
        assert_eq!(DelimPacket.delimited(), DelimPacketDelim);
        assert_eq!(DelimPacketDelim.delimited(), DelimPacketDelim);
    }

    #[test]
    fn core_concat_replays_the_later_word() {
        assert_eq!(Empty.concat(DelimPacket), DelimPacket);
        assert_eq!(Packet.concat(Empty), Packet);
        assert_eq!(Packet.concat(Packet), Packet);
        assert_eq!(Packet.concat(Delim), PacketDelim);
        assert_eq!(Delim.concat(PacketDelim), DelimPacketDelim);
        // a doubled packet run across the seam stays collapsed
        assert_eq!(DelimPacket.concat(Packet), DelimPacket);
        // but packet-delim-packet cannot be represented
        assert_eq!(PacketDelim.concat(Packet), Error);
        assert_eq!(Error.concat(Packet), Error);
    }

    #[test]
    fn core_endpoint_predicates() {
        assert!(Packet.begins_with_packet());
        assert!(PacketDelim.begins_with_packet());
        assert!(!DelimPacket.begins_with_packet());
        assert!(Packet.ends_with_packet());
        assert!(DelimPacket.ends_with_packet());
        assert!(!PacketDelim.ends_with_packet());
        assert!(Error.is_error());
    }
}

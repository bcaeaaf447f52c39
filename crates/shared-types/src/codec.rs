//! # Canonical Wire Codec
//!
//! Bit-exact binary layout for blocks, transactions and gossip envelopes.
//! All integers are little-endian; timestamps are IEEE-754 doubles;
//! variable-length fields carry a u32 length prefix; transaction counts use
//! an unsigned LEB128 varint.
//!
//! Layouts:
//!
//! ```text
//! transaction: version(4) ‖ type(1) ‖ from(23|0) ‖ to(23|0) ‖ amount(16) ‖
//!              nonce(8) ‖ fee(16) ‖ timestamp(8) ‖ payload_len(4) ‖
//!              payload ‖ signature(64)
//! header:      version(4) ‖ parent_hash(32) ‖ merkle_root(32) ‖ timestamp(8) ‖
//!              difficulty(4) ‖ nonce(8) ‖ miner(23) ‖ mode_tag(1)
//! block:       header ‖ attestation_count(2) ‖ [validator(23) ‖ sig(64)]* ‖
//!              varint tx_count ‖ transactions
//! gossip:      type(1) ‖ payload_len(4) ‖ payload ‖ node_id(32) ‖
//!              timestamp(8) ‖ message_id(32) ‖ ttl(1) ‖ signature(64)
//! ```
//!
//! The wire `payload` of a transaction is `pubkey_len(4) ‖ pubkey ‖ app_bytes`
//! so a signature can be checked against the sender address without a key
//! registry. Block height is not on the wire; it is derived from the parent.
//!
//! Decoding rejects unknown versions, unknown tags and trailing garbage.

use crate::amount::Amount;
use crate::config::ChainMode;
use crate::entities::{
    Attestation, Block, BlockHeader, GossipMessage, GossipType, Transaction, TxType,
};
use crate::{Address, ADDRESS_LEN, PROTOCOL_VERSION};
use thiserror::Error;

/// Fixed size of the header region covered by proof-of-work.
pub const HEADER_POW_LEN: usize = 4 + 32 + 32 + 8 + 4 + 8 + ADDRESS_LEN + 1;

/// Wire size of a single attestation.
pub const ATTESTATION_LEN: usize = ADDRESS_LEN + 64;

/// Decode failure. Carries enough context for a peer-facing rejection.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum CodecError {
    #[error("truncated input: needed {needed} more bytes at offset {offset}")]
    Truncated { offset: usize, needed: usize },

    #[error("unsupported version {version}")]
    UnsupportedVersion { version: u32 },

    #[error("unknown tag {tag} for {field}")]
    UnknownTag { field: &'static str, tag: u8 },

    #[error("{0} bytes of trailing garbage")]
    TrailingBytes(usize),

    #[error("length field overflows input: {field}")]
    LengthOverflow { field: &'static str },

    #[error("varint malformed")]
    BadVarint,
}

// =============================================================================
// PRIMITIVES
// =============================================================================

struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], CodecError> {
        if self.buf.len() - self.pos < n {
            return Err(CodecError::Truncated {
                offset: self.pos,
                needed: n - (self.buf.len() - self.pos),
            });
        }
        let slice = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn u8(&mut self) -> Result<u8, CodecError> {
        Ok(self.take(1)?[0])
    }

    fn u16(&mut self) -> Result<u16, CodecError> {
        Ok(u16::from_le_bytes(self.take(2)?.try_into().unwrap()))
    }

    fn u32(&mut self) -> Result<u32, CodecError> {
        Ok(u32::from_le_bytes(self.take(4)?.try_into().unwrap()))
    }

    fn u64(&mut self) -> Result<u64, CodecError> {
        Ok(u64::from_le_bytes(self.take(8)?.try_into().unwrap()))
    }

    fn f64(&mut self) -> Result<f64, CodecError> {
        Ok(f64::from_le_bytes(self.take(8)?.try_into().unwrap()))
    }

    fn amount(&mut self) -> Result<Amount, CodecError> {
        Ok(Amount::from_le_bytes(self.take(16)?.try_into().unwrap()))
    }

    fn hash(&mut self) -> Result<[u8; 32], CodecError> {
        Ok(self.take(32)?.try_into().unwrap())
    }

    fn address(&mut self) -> Result<Address, CodecError> {
        Ok(self.take(ADDRESS_LEN)?.try_into().unwrap())
    }

    fn signature(&mut self) -> Result<[u8; 64], CodecError> {
        Ok(self.take(64)?.try_into().unwrap())
    }

    fn varint(&mut self) -> Result<u64, CodecError> {
        let mut value = 0u64;
        let mut shift = 0u32;
        loop {
            let byte = self.u8()?;
            if shift == 63 && byte > 1 {
                return Err(CodecError::BadVarint);
            }
            value |= u64::from(byte & 0x7f) << shift;
            if byte & 0x80 == 0 {
                return Ok(value);
            }
            shift += 7;
            if shift > 63 {
                return Err(CodecError::BadVarint);
            }
        }
    }

    fn finish(&self) -> Result<(), CodecError> {
        let rest = self.buf.len() - self.pos;
        if rest != 0 {
            return Err(CodecError::TrailingBytes(rest));
        }
        Ok(())
    }
}

fn write_varint(out: &mut Vec<u8>, mut value: u64) {
    loop {
        let byte = (value & 0x7f) as u8;
        value >>= 7;
        if value == 0 {
            out.push(byte);
            return;
        }
        out.push(byte | 0x80);
    }
}

// =============================================================================
// TRANSACTIONS
// =============================================================================

/// Everything except the trailing signature; what the sender signs and what
/// the transaction hash commits to.
pub fn tx_signing_bytes(tx: &Transaction) -> Vec<u8> {
    let mut out = Vec::with_capacity(128 + tx.payload.len());
    encode_tx_into(tx, &mut out, false);
    out
}

pub fn encode_transaction(tx: &Transaction) -> Vec<u8> {
    let mut out = Vec::with_capacity(192 + tx.payload.len());
    encode_tx_into(tx, &mut out, true);
    out
}

fn encode_tx_into(tx: &Transaction, out: &mut Vec<u8>, with_signature: bool) {
    out.extend_from_slice(&tx.version.to_le_bytes());
    out.push(tx.tx_type as u8);
    if tx.tx_type.has_from() {
        out.extend_from_slice(&tx.from.unwrap_or_default());
    }
    if tx.tx_type.has_to() {
        out.extend_from_slice(&tx.to.unwrap_or_default());
    }
    out.extend_from_slice(&tx.amount.to_le_bytes());
    out.extend_from_slice(&tx.nonce.to_le_bytes());
    out.extend_from_slice(&tx.fee.to_le_bytes());
    out.extend_from_slice(&tx.timestamp.to_le_bytes());

    let wire_payload_len = 4 + tx.sender_pubkey.len() + tx.payload.len();
    out.extend_from_slice(&(wire_payload_len as u32).to_le_bytes());
    out.extend_from_slice(&(tx.sender_pubkey.len() as u32).to_le_bytes());
    out.extend_from_slice(&tx.sender_pubkey);
    out.extend_from_slice(&tx.payload);

    if with_signature {
        out.extend_from_slice(&tx.signature);
    }
}

pub fn decode_transaction(bytes: &[u8]) -> Result<Transaction, CodecError> {
    let mut reader = Reader::new(bytes);
    let tx = read_transaction(&mut reader)?;
    reader.finish()?;
    Ok(tx)
}

fn read_transaction(reader: &mut Reader<'_>) -> Result<Transaction, CodecError> {
    let version = reader.u32()?;
    if version != PROTOCOL_VERSION {
        return Err(CodecError::UnsupportedVersion { version });
    }
    let type_byte = reader.u8()?;
    let tx_type = TxType::from_wire(type_byte).ok_or(CodecError::UnknownTag {
        field: "tx_type",
        tag: type_byte,
    })?;

    let from = if tx_type.has_from() {
        Some(reader.address()?)
    } else {
        None
    };
    let to = if tx_type.has_to() {
        Some(reader.address()?)
    } else {
        None
    };

    let amount = reader.amount()?;
    let nonce = reader.u64()?;
    let fee = reader.amount()?;
    let timestamp = reader.f64()?;

    let wire_payload_len = reader.u32()? as usize;
    let blob = reader.take(wire_payload_len)?;
    if blob.len() < 4 {
        return Err(CodecError::LengthOverflow { field: "payload" });
    }
    let pubkey_len = u32::from_le_bytes(blob[..4].try_into().unwrap()) as usize;
    if 4 + pubkey_len > blob.len() {
        return Err(CodecError::LengthOverflow { field: "pubkey" });
    }
    let sender_pubkey = blob[4..4 + pubkey_len].to_vec();
    let payload = blob[4 + pubkey_len..].to_vec();

    let signature = reader.signature()?;

    Ok(Transaction {
        version,
        tx_type,
        from,
        to,
        amount,
        nonce,
        fee,
        timestamp,
        sender_pubkey,
        payload,
        signature,
    })
}

/// Encoded size in bytes, used for mempool accounting and block caps.
pub fn transaction_size(tx: &Transaction) -> usize {
    encode_transaction(tx).len()
}

// =============================================================================
// BLOCKS
// =============================================================================

/// The proof-of-work region: every header field except attestations.
pub fn header_pow_bytes(header: &BlockHeader) -> [u8; HEADER_POW_LEN] {
    let mut out = [0u8; HEADER_POW_LEN];
    let mut pos = 0;
    let mut put = |bytes: &[u8]| {
        out[pos..pos + bytes.len()].copy_from_slice(bytes);
        pos += bytes.len();
    };
    put(&header.version.to_le_bytes());
    put(&header.parent_hash);
    put(&header.merkle_root);
    put(&header.timestamp.to_le_bytes());
    put(&header.difficulty.to_le_bytes());
    put(&header.nonce.to_le_bytes());
    put(&header.miner);
    put(&[header.mode.to_wire()]);
    debug_assert_eq!(pos, HEADER_POW_LEN);
    out
}

pub fn encode_block(block: &Block) -> Vec<u8> {
    let mut out = Vec::with_capacity(
        HEADER_POW_LEN + 2 + block.attestations.len() * ATTESTATION_LEN + 256,
    );
    out.extend_from_slice(&header_pow_bytes(&block.header));
    out.extend_from_slice(&(block.attestations.len() as u16).to_le_bytes());
    for att in &block.attestations {
        out.extend_from_slice(&att.validator);
        out.extend_from_slice(&att.signature);
    }
    write_varint(&mut out, block.transactions.len() as u64);
    for tx in &block.transactions {
        encode_tx_into(tx, &mut out, true);
    }
    out
}

/// Decode a block. Height is not on the wire; the caller assigns it from the
/// parent lookup (decoded blocks start at height 0).
pub fn decode_block(bytes: &[u8]) -> Result<Block, CodecError> {
    let mut reader = Reader::new(bytes);

    let version = reader.u32()?;
    if version != PROTOCOL_VERSION {
        return Err(CodecError::UnsupportedVersion { version });
    }
    let parent_hash = reader.hash()?;
    let merkle_root = reader.hash()?;
    let timestamp = reader.f64()?;
    let difficulty = reader.u32()?;
    let nonce = reader.u64()?;
    let miner = reader.address()?;
    let mode_byte = reader.u8()?;
    let mode = ChainMode::from_wire(mode_byte).ok_or(CodecError::UnknownTag {
        field: "mode_tag",
        tag: mode_byte,
    })?;

    let attestation_count = reader.u16()? as usize;
    let mut attestations = Vec::with_capacity(attestation_count);
    for _ in 0..attestation_count {
        attestations.push(Attestation {
            validator: reader.address()?,
            signature: reader.signature()?,
        });
    }

    let tx_count = reader.varint()? as usize;
    let mut transactions = Vec::with_capacity(tx_count.min(4096));
    for _ in 0..tx_count {
        transactions.push(read_transaction(&mut reader)?);
    }
    reader.finish()?;

    Ok(Block {
        header: BlockHeader {
            version,
            height: 0,
            parent_hash,
            merkle_root,
            timestamp,
            difficulty,
            nonce,
            miner,
            mode,
        },
        attestations,
        transactions,
    })
}

pub fn block_size(block: &Block) -> usize {
    encode_block(block).len()
}

// =============================================================================
// GOSSIP
// =============================================================================

/// The region a gossip message id commits to and the node signs.
pub fn gossip_id_bytes(msg: &GossipMessage) -> Vec<u8> {
    let mut out = Vec::with_capacity(45 + msg.payload.len());
    out.push(msg.msg_type as u8);
    out.extend_from_slice(&(msg.payload.len() as u32).to_le_bytes());
    out.extend_from_slice(&msg.payload);
    out.extend_from_slice(&msg.node_id);
    out.extend_from_slice(&msg.timestamp.to_le_bytes());
    out
}

pub fn encode_gossip(msg: &GossipMessage) -> Vec<u8> {
    let mut out = gossip_id_bytes(msg);
    out.extend_from_slice(&msg.message_id);
    out.push(msg.ttl);
    out.extend_from_slice(&msg.signature);
    out
}

pub fn decode_gossip(bytes: &[u8]) -> Result<GossipMessage, CodecError> {
    let mut reader = Reader::new(bytes);
    let type_byte = reader.u8()?;
    let msg_type = GossipType::from_wire(type_byte).ok_or(CodecError::UnknownTag {
        field: "gossip_type",
        tag: type_byte,
    })?;
    let payload_len = reader.u32()? as usize;
    let payload = reader.take(payload_len)?.to_vec();
    let node_id = reader.hash()?;
    let timestamp = reader.f64()?;
    let message_id = reader.hash()?;
    let ttl = reader.u8()?;
    let signature = reader.signature()?;
    reader.finish()?;

    Ok(GossipMessage {
        msg_type,
        payload,
        node_id,
        timestamp,
        message_id,
        ttl,
        signature,
    })
}

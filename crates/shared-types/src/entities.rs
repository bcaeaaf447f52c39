//! # Core Domain Entities
//!
//! Defines the entities exchanged between subsystems.
//!
//! ## Clusters
//!
//! - **Chain**: `Block`, `BlockHeader`, `Transaction`, `Attestation`
//! - **Logistics**: `Contract`, `Checkpoint`, `GeoPoint`, `CargoManifest`
//! - **State**: `Account`, `RoleMetrics`
//! - **Gossip**: `GossipMessage`
//!
//! Identity rules: entities reference each other by hash or address, never by
//! pointer. The chain actor resolves references through indexed lookup.

use crate::amount::Amount;
use crate::config::ChainMode;
use crate::{Address, ZERO_ADDRESS};
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, Bytes};

/// A 32-byte hash (single or double SHA-256 depending on context).
pub type Hash = [u8; 32];

/// A 64-byte signature (Ed25519 or compact ECDSA).
pub type Signature = [u8; 64];

/// Raw public key bytes (32 for Ed25519, 33 for compressed secp256k1).
pub type PublicKeyBytes = Vec<u8>;

/// Validators are identified by their account address.
pub type ValidatorId = Address;

// =============================================================================
// CLUSTER A: THE CHAIN
// =============================================================================

/// Transaction kind tag. The wire byte is the discriminant.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum TxType {
    Transfer = 0,
    ContractCreate = 1,
    ContractAccept = 2,
    ContractCheckpoint = 3,
    ContractFinalize = 4,
    ContractDispute = 5,
    MiningReward = 6,
}

impl TxType {
    pub fn from_wire(byte: u8) -> Option<TxType> {
        match byte {
            0 => Some(TxType::Transfer),
            1 => Some(TxType::ContractCreate),
            2 => Some(TxType::ContractAccept),
            3 => Some(TxType::ContractCheckpoint),
            4 => Some(TxType::ContractFinalize),
            5 => Some(TxType::ContractDispute),
            6 => Some(TxType::MiningReward),
            _ => None,
        }
    }

    /// Reward rows have no sender; everything else is signed by `from`.
    pub fn has_from(&self) -> bool {
        !matches!(self, TxType::MiningReward)
    }

    /// Contract operations address a contract id in the payload, not an
    /// account, so the `to` field is absent on the wire.
    pub fn has_to(&self) -> bool {
        matches!(
            self,
            TxType::Transfer | TxType::ContractCreate | TxType::MiningReward
        )
    }

    pub fn is_contract_op(&self) -> bool {
        matches!(
            self,
            TxType::ContractCreate
                | TxType::ContractAccept
                | TxType::ContractCheckpoint
                | TxType::ContractFinalize
                | TxType::ContractDispute
        )
    }
}

/// A signed transaction.
///
/// `sender_pubkey` rides at the head of the wire payload (length-prefixed) so
/// that `from` can be checked against SHA-256(pubkey) and the signature
/// verified without a key registry. Reward rows carry neither sender nor
/// signature material.
#[serde_as]
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub version: u32,
    pub tx_type: TxType,
    pub from: Option<Address>,
    pub to: Option<Address>,
    pub amount: Amount,
    /// Per-sender monotonic nonce; 0 for reward rows.
    pub nonce: u64,
    pub fee: Amount,
    /// Seconds since the Unix epoch.
    pub timestamp: f64,
    pub sender_pubkey: PublicKeyBytes,
    /// Opaque application payload (contract operations encode their payload
    /// structs here with bincode).
    pub payload: Vec<u8>,
    #[serde_as(as = "Bytes")]
    pub signature: Signature,
}

impl Transaction {
    /// The sender address, or the zero address for reward rows.
    pub fn sender(&self) -> Address {
        self.from.unwrap_or(ZERO_ADDRESS)
    }

    pub fn is_reward(&self) -> bool {
        self.tx_type == TxType::MiningReward
    }
}

/// Block header. The proof-of-work hash covers every field except the
/// attestation set, which signs the header hash after mining.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BlockHeader {
    pub version: u32,
    /// Height is derived from the parent on decode; it is not on the wire.
    pub height: u64,
    pub parent_hash: Hash,
    pub merkle_root: Hash,
    /// Seconds since the Unix epoch (wire: IEEE-754 double, LE).
    pub timestamp: f64,
    /// Required leading zero bits of the header hash.
    pub difficulty: u32,
    pub nonce: u64,
    pub miner: Address,
    pub mode: ChainMode,
}

impl BlockHeader {
    pub fn is_genesis(&self) -> bool {
        self.height == 0 && self.parent_hash == [0u8; 32]
    }
}

/// A validator's signature over a block header hash.
#[serde_as]
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Attestation {
    pub validator: ValidatorId,
    #[serde_as(as = "Bytes")]
    pub signature: Signature,
}

/// A full block: header, quorum attestations, transactions.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Block {
    pub header: BlockHeader,
    /// BFT quorum signatures over the header hash. Empty for OFF_GRID blocks
    /// and blocks that finalize no contracts.
    pub attestations: Vec<Attestation>,
    pub transactions: Vec<Transaction>,
}

impl Block {
    /// The reward row, if present at index 0 where it must sit.
    pub fn reward_tx(&self) -> Option<&Transaction> {
        self.transactions.first().filter(|tx| tx.is_reward())
    }
}

// =============================================================================
// CLUSTER B: LOGISTICS
// =============================================================================

/// A WGS-84 coordinate.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

impl GeoPoint {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    pub fn in_range(&self) -> bool {
        (-90.0..=90.0).contains(&self.lat) && (-180.0..=180.0).contains(&self.lng)
    }
}

/// Optional environmental readings attached to a checkpoint.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SensorReadings {
    pub temperature_c: f64,
    pub humidity_pct: f64,
    pub shock: bool,
}

/// A geolocated, driver-signed delivery checkpoint.
///
/// Each checkpoint commits to its predecessor through `prev_hash`, forming a
/// tamper-evident chain inside the contract.
#[serde_as]
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    /// Monotonic sequence number, starting at 1.
    pub seq: u32,
    pub timestamp: f64,
    pub position: GeoPoint,
    /// Reported GPS accuracy in meters.
    pub accuracy_m: f64,
    pub sensors: Option<SensorReadings>,
    /// Hash of the previous checkpoint, all-zero for the first.
    pub prev_hash: Hash,
    /// Driver signature over (contract_id ‖ seq ‖ timestamp ‖ coord ‖ prev_hash).
    #[serde_as(as = "Bytes")]
    pub signature: Signature,
}

/// Cargo attributes fixed at contract creation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CargoManifest {
    pub cargo_type: String,
    pub weight_kg: f64,
    pub volume_m3: f64,
    /// 0 = lowest, 255 = highest.
    pub priority: u8,
    pub estimated_value: Amount,
}

/// Contract lifecycle states. VALIDATED, EXPIRED and DISPUTED are terminal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ContractState {
    Draft,
    Open,
    Accepted,
    InTransit,
    Delivered,
    Validated,
    Expired,
    Disputed,
}

impl ContractState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ContractState::Validated | ContractState::Expired | ContractState::Disputed
        )
    }
}

/// A logistics delivery contract.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Contract {
    /// Content id: double SHA-256 of the creating transaction.
    pub id: Hash,
    /// The establishment that created the contract.
    pub creator: Address,
    /// The driver, assigned at acceptance.
    pub driver: Option<Address>,
    /// The driver's Ed25519 checkpoint key, registered at acceptance and
    /// verified against every checkpoint signature.
    pub driver_key: Option<PublicKeyBytes>,
    pub pickup: GeoPoint,
    pub delivery: GeoPoint,
    /// Envelope disc radius in meters.
    pub tolerance_radius_m: f64,
    /// Upper bound on acceptable GPS error for the terminal checkpoint.
    pub max_error_m: f64,
    pub cargo: CargoManifest,
    /// Escrowed by the creator at creation, released at VALIDATED.
    pub escrow: Amount,
    pub expires_at: f64,
    pub state: ContractState,
    pub checkpoints: Vec<Checkpoint>,
    pub created_height: u64,
}

impl Contract {
    pub fn last_checkpoint(&self) -> Option<&Checkpoint> {
        self.checkpoints.last()
    }
}

// =============================================================================
// CLUSTER C: STATE
// =============================================================================

/// Account standing.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum AccountStatus {
    #[default]
    Active,
    Frozen,
}

/// Per-role delivery metrics feeding reputation.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RoleMetrics {
    pub deliveries: u64,
    pub revenue: Amount,
    pub completed_contracts: u64,
    pub avg_rating: f64,
}

/// Address-indexed account state.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Account {
    pub balance: Amount,
    /// Count of transactions applied for this sender; the next valid
    /// transaction nonce is `nonce + 1`.
    pub nonce: u64,
    /// Reputation score in [0, 1].
    pub reputation: f64,
    pub metrics: RoleMetrics,
    pub created_at: f64,
    pub status: AccountStatus,
}

impl Account {
    pub fn new(created_at: f64) -> Self {
        Self {
            balance: Amount::ZERO,
            nonce: 0,
            reputation: 0.5,
            metrics: RoleMetrics::default(),
            created_at,
            status: AccountStatus::Active,
        }
    }
}

// =============================================================================
// CLUSTER D: GOSSIP
// =============================================================================

/// Gossip message kind. The wire byte is the discriminant.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum GossipType {
    Block = 0,
    Transaction = 1,
    PeerDiscovery = 2,
    SyncRequest = 3,
    SyncResponse = 4,
    FallbackRequest = 5,
    Ack = 6,
}

impl GossipType {
    pub fn from_wire(byte: u8) -> Option<GossipType> {
        match byte {
            0 => Some(GossipType::Block),
            1 => Some(GossipType::Transaction),
            2 => Some(GossipType::PeerDiscovery),
            3 => Some(GossipType::SyncRequest),
            4 => Some(GossipType::SyncResponse),
            5 => Some(GossipType::FallbackRequest),
            6 => Some(GossipType::Ack),
            _ => None,
        }
    }
}

/// Envelope for every message handed to the network layer.
#[serde_as]
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GossipMessage {
    pub msg_type: GossipType,
    pub payload: Vec<u8>,
    /// Ed25519 public key of the sending node.
    pub node_id: [u8; 32],
    pub timestamp: f64,
    /// SHA-256 of (type ‖ payload ‖ node_id ‖ timestamp).
    pub message_id: Hash,
    pub ttl: u8,
    /// Node signature over the canonical encoding.
    #[serde_as(as = "Bytes")]
    pub signature: Signature,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tx_type_wire_round_trip() {
        for byte in 0u8..=6 {
            let ty = TxType::from_wire(byte).unwrap();
            assert_eq!(ty as u8, byte);
        }
        assert!(TxType::from_wire(7).is_none());
    }

    #[test]
    fn test_reward_has_no_sender() {
        assert!(!TxType::MiningReward.has_from());
        assert!(TxType::Transfer.has_from());
    }

    #[test]
    fn test_contract_ops_have_no_to() {
        assert!(!TxType::ContractCheckpoint.has_to());
        assert!(!TxType::ContractFinalize.has_to());
        assert!(TxType::ContractCreate.has_to());
    }

    #[test]
    fn test_terminal_states() {
        assert!(ContractState::Validated.is_terminal());
        assert!(ContractState::Expired.is_terminal());
        assert!(ContractState::Disputed.is_terminal());
        assert!(!ContractState::InTransit.is_terminal());
    }

    #[test]
    fn test_geo_point_range() {
        assert!(GeoPoint::new(-23.55, -46.63).in_range());
        assert!(!GeoPoint::new(91.0, 0.0).in_range());
        assert!(!GeoPoint::new(0.0, -181.0).in_range());
    }
}

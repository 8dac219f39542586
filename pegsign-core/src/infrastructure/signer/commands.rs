//! Wire command names and field keys of the remote signer protocol.

pub const CMD_VERSION: &str = "version";
pub const CMD_GET_PUBKEY: &str = "getPubKey";
pub const CMD_SIGN: &str = "sign";
pub const CMD_BLOCKCHAIN_STATE: &str = "blockchainState";
pub const CMD_ADVANCE_BLOCKCHAIN: &str = "advanceBlockchain";
pub const CMD_UPDATE_ANCESTOR_BLOCK: &str = "updateAncestorBlock";
pub const CMD_RESET_ADVANCE_BLOCKCHAIN: &str = "resetAdvanceBlockchain";
pub const CMD_BLOCKCHAIN_PARAMETERS: &str = "blockchainParameters";

pub const FIELD_COMMAND: &str = "command";
pub const FIELD_VERSION: &str = "version";
pub const FIELD_ERROR_CODE: &str = "errorcode";
pub const FIELD_KEY_ID: &str = "keyId";
pub const FIELD_PUBKEY: &str = "pubKey";
pub const FIELD_MESSAGE: &str = "message";
pub const FIELD_AUTH: &str = "auth";
pub const FIELD_SIGNATURE: &str = "signature";
pub const FIELD_STATE: &str = "state";
pub const FIELD_BLOCKS: &str = "blocks";
pub const FIELD_BROTHERS: &str = "brothers";
pub const FIELD_PARAMETERS: &str = "parameters";

pub const MSG_HASH: &str = "hash";
pub const MSG_TX: &str = "tx";
pub const MSG_INPUT: &str = "input";
pub const MSG_SIGHASH_MODE: &str = "sighashComputationMode";
pub const MSG_WITNESS_SCRIPT: &str = "witnessScript";
pub const MSG_OUTPOINT_VALUE: &str = "outpointValue";
pub const AUTH_RECEIPT: &str = "receipt";
pub const AUTH_RECEIPT_MERKLE_PROOF: &str = "receipt_merkle_proof";

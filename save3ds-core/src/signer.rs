use crate::crypto::{aes_cmac, sha256};

/// One CMAC "kind" from the table in spec §6: builds the kind-specific
/// prefix block that gets SHA-256'd before being AES-CMAC'd against the
/// outer container's first 16 bytes.
pub trait Signer {
    fn block(&self, data: Vec<u8>) -> Vec<u8>;

    fn hash(&self, data: Vec<u8>) -> [u8; 32] {
        sha256(&self.block(data))
    }

    /// Returns whether `signature` matches the CMAC of `data` under `key`.
    fn verify(&self, key: &[u8; 16], data: Vec<u8>, signature: &[u8; 16]) -> bool {
        &aes_cmac(key, &self.hash(data)) == signature
    }
}

pub struct DisaNandSigner {
    pub id: u64,
}
impl Signer for DisaNandSigner {
    fn block(&self, mut data: Vec<u8>) -> Vec<u8> {
        let mut result = Vec::from(&b"CTR-SYS0"[..]);
        result.extend(&self.id.to_le_bytes());
        result.append(&mut data);
        result
    }
}

struct CtrSav0Signer;
impl Signer for CtrSav0Signer {
    fn block(&self, mut data: Vec<u8>) -> Vec<u8> {
        let mut result = Vec::from(&b"CTR-SAV0"[..]);
        result.append(&mut data);
        result
    }
}

pub struct DisaSdSigner {
    pub id: u64,
}
impl Signer for DisaSdSigner {
    fn block(&self, data: Vec<u8>) -> Vec<u8> {
        let mut result = Vec::from(&b"CTR-SIGN"[..]);
        result.extend(&self.id.to_le_bytes());
        result.extend(&CtrSav0Signer.hash(data));
        result
    }
}

pub struct ExtDataSigner {
    pub id: u64,
    pub sub_id: Option<u64>,
}
impl Signer for ExtDataSigner {
    fn block(&self, mut data: Vec<u8>) -> Vec<u8> {
        let mut result = Vec::from(&b"CTR-EXT0"[..]);
        result.extend(&self.id.to_le_bytes());
        let quota_flag: u32 = if self.sub_id.is_some() { 1 } else { 0 };
        result.extend(&quota_flag.to_le_bytes());
        result.extend(&self.sub_id.unwrap_or(0).to_le_bytes());
        result.append(&mut data);
        result
    }
}

pub struct TitleDbSigner {
    pub id: u32,
}
impl Signer for TitleDbSigner {
    fn block(&self, mut data: Vec<u8>) -> Vec<u8> {
        let mut result = Vec::from(&b"CTR-9DB0"[..]);
        result.extend(&self.id.to_le_bytes());
        result.append(&mut data);
        result
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn extdata_signer_quota_flag_follows_sub_id_presence() {
        let with_sub = ExtDataSigner {
            id: 1,
            sub_id: Some(2),
        };
        let block = with_sub.block(vec![9, 9]);
        // "CTR-EXT0"(8) + id(8) + quotaFlag(4) + subId(8) = 28 bytes of prefix
        assert_eq!(&block[0..8], b"CTR-EXT0");
        assert_eq!(&block[16..20], &1u32.to_le_bytes());
        assert_eq!(&block[20..28], &2u64.to_le_bytes());
        assert_eq!(&block[28..], &[9, 9]);

        let without_sub = ExtDataSigner {
            id: 1,
            sub_id: None,
        };
        let block = without_sub.block(vec![]);
        assert_eq!(&block[16..20], &0u32.to_le_bytes());
        assert_eq!(&block[20..28], &0u64.to_le_bytes());
    }

    #[test]
    fn verify_round_trips_through_cmac() {
        let signer = TitleDbSigner { id: 7 };
        let key = [0x42; 16];
        let data = vec![1, 2, 3, 4];
        let hash = signer.hash(data.clone());
        let sig = aes_cmac(&key, &hash);
        assert!(signer.verify(&key, data, &sig));
    }
}

use anyhow::{anyhow, Context, Result};
use std::io::Read;

use crate::core::Ensemble;

/// Magic prefix of every recorded block.
pub const BLOCK_MAGIC: &[u8; 8] = b"ADCPENS1";

/// Encode one ensemble as a length-framed block: magic, little-endian
/// payload length, payload.
pub fn encode_block(ensemble: &Ensemble) -> Result<Vec<u8>> {
    let payload = serde_json::to_vec(ensemble).context("failed to serialize ensemble")?;
    let mut block = Vec::with_capacity(BLOCK_MAGIC.len() + 4 + payload.len());
    block.extend_from_slice(BLOCK_MAGIC);
    block.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    block.extend_from_slice(&payload);
    Ok(block)
}

/// Read framed blocks until EOF. Used by playback and by tests verifying
/// recorded files.
pub fn decode_blocks<R: Read>(mut reader: R) -> Result<Vec<Ensemble>> {
    let mut ensembles = Vec::new();
    loop {
        let mut magic = [0u8; 8];
        match reader.read_exact(&mut magic) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => break,
            Err(e) => return Err(e).context("failed to read block magic"),
        }
        if &magic != BLOCK_MAGIC {
            return Err(anyhow!("bad block magic: {magic:02x?}"));
        }

        let mut len_bytes = [0u8; 4];
        reader
            .read_exact(&mut len_bytes)
            .context("failed to read block length")?;
        let len = u32::from_le_bytes(len_bytes) as usize;

        let mut payload = vec![0u8; len];
        reader
            .read_exact(&mut payload)
            .context("truncated block payload")?;
        let ensemble =
            serde_json::from_slice(&payload).context("failed to deserialize ensemble block")?;
        ensembles.push(ensemble);
    }
    Ok(ensembles)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::EnsembleSource;

    #[test]
    fn encode_decode_round_trip() {
        let mut ens = Ensemble::with_uniform(4, 4, 1.25);
        ens.ensemble_number = 42;
        ens.source = EnsembleSource::LongTermAverage;

        let mut bytes = encode_block(&ens).unwrap();
        bytes.extend(encode_block(&ens).unwrap());

        let decoded = decode_blocks(bytes.as_slice()).unwrap();
        assert_eq!(decoded.len(), 2);
        assert_eq!(decoded[0], ens);
    }

    #[test]
    fn bad_magic_is_rejected() {
        let bytes = b"NOTADCP!\x00\x00\x00\x00".to_vec();
        assert!(decode_blocks(bytes.as_slice()).is_err());
    }

    #[test]
    fn truncated_payload_is_rejected() {
        let ens = Ensemble::new(1, 1);
        let mut bytes = encode_block(&ens).unwrap();
        bytes.truncate(bytes.len() - 3);
        assert!(decode_blocks(bytes.as_slice()).is_err());
    }

    #[test]
    fn empty_input_decodes_to_nothing() {
        assert!(decode_blocks(std::io::empty()).unwrap().is_empty());
    }
}

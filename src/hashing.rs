use anyhow::Result;
use sha2::{Digest, Sha256};
use std::path::Path;
use tokio::fs::File;
use tokio::io::AsyncReadExt;

pub fn digest_bytes(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

pub async fn calculate_hash(filepath: &Path) -> Result<String> {
    let mut file = File::open(filepath).await?;
    let mut hasher = Sha256::new();
    let mut buffer = [0; 8192];

    loop {
        let n = file.read(&mut buffer).await?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
    }

    Ok(hex::encode(hasher.finalize()))
}

//! Invocation of the external decryption helper. The helper's internals (mp4decrypt, shaka
//! packager, a shell wrapper around either) are none of our business: the contract is the
//! six-argument command line and a zero exit status, with the decrypted file at `outpath`.

use std::path::Path;

use tokio::process::Command;
use tracing::{error, info, warn};

use crate::{Error, Result};

// Limit subprocess output replayed into our logs.
fn partial_process_output(out: &[u8]) -> String {
    let text = String::from_utf8_lossy(&out[..out.len().min(4096)]);
    text.trim_end().to_string()
}

/// Run `decrypt_script {key_id} {key} {src} {out} {repo_root} {track}`. A non-zero exit or an
/// empty/missing output file fails the current cycle.
pub async fn decrypt_segment(
    decrypt_script: &Path,
    key_id: &str,
    key: &str,
    src: &Path,
    outpath: &Path,
    repo_root: &Path,
    track: &str,
) -> Result<()> {
    let args = [
        key_id.to_string(),
        key.to_string(),
        src.to_string_lossy().to_string(),
        outpath.to_string_lossy().to_string(),
        repo_root.to_string_lossy().to_string(),
        track.to_string(),
    ];
    info!("  Running decrypter {} {}", decrypt_script.display(), args.join(" "));
    let out = Command::new(decrypt_script)
        .args(&args)
        .output()
        .await
        .map_err(|e| Error::Io(e, String::from("spawning decrypter")))?;

    let mut no_output = false;
    match tokio::fs::metadata(outpath).await {
        Ok(metadata) => {
            if metadata.len() == 0 {
                no_output = true;
            }
        }
        Err(_) => no_output = true,
    }
    if !out.status.success() || no_output {
        error!("  decrypter subprocess failed for {track} segment");
        let msg = partial_process_output(&out.stdout);
        if !msg.is_empty() {
            warn!("  decrypter stdout: {msg}");
        }
        let msg = partial_process_output(&out.stderr);
        if !msg.is_empty() {
            warn!("  decrypter stderr: {msg}");
        }
        warn!("  undecrypted {track} segment left in {}", src.display());
        return Err(Error::SegmentManipulationFailed(format!(
            "{track} segment {}",
            src.display()
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_process_output() {
        assert_eq!(partial_process_output(b"hello\n"), "hello");
        let long = vec![b'x'; 10_000];
        assert_eq!(partial_process_output(&long).len(), 4096);
    }
}

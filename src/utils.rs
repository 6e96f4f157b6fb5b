use candle_core::Device;
use candle_core::utils::{cuda_is_available, metal_is_available};
use tokenizers::Tokenizer;

pub fn device(cpu: bool) -> candle_core::Result<Device> {
    if cpu {
        Ok(Device::Cpu)
    } else if cuda_is_available() {
        Ok(Device::new_cuda(0)?)
    } else if metal_is_available() {
        Ok(Device::new_metal(0)?)
    } else {
        Ok(Device::Cpu)
    }
}

pub fn token_id(tokenizer: &Tokenizer, token: &str) -> candle_core::Result<u32> {
    match tokenizer.token_to_id(token) {
        None => candle_core::bail!("no token-id for {token}"),
        Some(id) => Ok(id),
    }
}

/// File-name stem for a repo identifier: lower-cased, spaces and slashes as hyphens.
pub fn safe_name(repo_name: &str) -> String {
    repo_name.trim().to_lowercase().replace([' ', '/'], "-")
}

/// Sibling path used while an artifact is still being written.
pub(crate) fn partial_path(output: &std::path::Path) -> std::path::PathBuf {
    let ext = output
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("tmp");
    output.with_extension(format!("partial.{ext}"))
}

/// Truncates to `max_chars` characters, ending with `...` when shortened.
pub fn ellipsize(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let keep = max_chars.saturating_sub(3);
    let mut out: String = text.chars().take(keep).collect();
    out.push_str("...");
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn safe_name_normalizes_repo_identifiers() {
        assert_eq!(safe_name("Awesome Project"), "awesome-project");
        assert_eq!(safe_name("rust-lang/Cargo"), "rust-lang-cargo");
    }

    #[test]
    fn partial_path_keeps_extension_last() {
        assert_eq!(
            partial_path(Path::new("/out/demo-es.wav")),
            Path::new("/out/demo-es.partial.wav")
        );
        assert_eq!(
            partial_path(Path::new("demo-reel.mp4")),
            Path::new("demo-reel.partial.mp4")
        );
    }

    #[test]
    fn ellipsize_limits_characters_not_bytes() {
        let long = "é".repeat(150);
        let cut = ellipsize(&long, 100);
        assert_eq!(cut.chars().count(), 100);
        assert!(cut.ends_with("..."));
        assert_eq!(ellipsize("short", 100), "short");
        let exact = "x".repeat(100);
        assert_eq!(ellipsize(&exact, 100), exact);
    }
}

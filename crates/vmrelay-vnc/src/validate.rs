//! VM reference validation

use std::sync::LazyLock;

use regex::Regex;

use crate::error::{Error, Result};

/// Longest accepted VM name or ID
pub const MAX_VM_REF_LEN: usize = 128;

static VM_REF_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9._-]+$").expect("VM_REF_REGEX is a compile-time constant")
});

/// Accept `1..=128` characters from `[A-Za-z0-9._-]`, excluding the dot segments
pub fn validate_vm_ref(vm: &str) -> Result<()> {
    if vm.is_empty()
        || vm.len() > MAX_VM_REF_LEN
        || vm == "."
        || vm == ".."
        || !VM_REF_REGEX.is_match(vm)
    {
        return Err(Error::InvalidVmRef(vm.chars().take(MAX_VM_REF_LEN).collect()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accepts_names_and_ids() {
        assert!(validate_vm_ref("web-01").is_ok());
        assert!(validate_vm_ref("vm_2.prod").is_ok());
        assert!(validate_vm_ref("6f1c2a4e-93b1-4d7e-a1c0-0e5f3b2d9a11").is_ok());
        assert!(validate_vm_ref(&"a".repeat(MAX_VM_REF_LEN)).is_ok());
    }

    #[test]
    fn test_rejects_malformed() {
        assert!(validate_vm_ref("").is_err());
        assert!(validate_vm_ref(&"a".repeat(MAX_VM_REF_LEN + 1)).is_err());
        assert!(validate_vm_ref("..").is_err());
        assert!(validate_vm_ref("web 01").is_err());
        assert!(validate_vm_ref("vm/../etc").is_err());
        assert!(validate_vm_ref("vm%2F").is_err());
        assert!(validate_vm_ref("ünïcode").is_err());
    }
}

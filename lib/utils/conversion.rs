//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

const MIB: u64 = 1024 * 1024;

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// Converts a size in MiB to bytes.
pub fn mib_to_bytes(mib: u64) -> u64 {
    mib * MIB
}

/// Converts a size in bytes to MiB, rounding up so no memory is lost.
pub fn bytes_to_mib_ceil(bytes: u64) -> u64 {
    bytes.div_ceil(MIB)
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mib_bytes_conversion() {
        assert_eq!(mib_to_bytes(4_000), 4_194_304_000);
        assert_eq!(bytes_to_mib_ceil(4_194_304_000), 4_000);
        assert_eq!(bytes_to_mib_ceil(1), 1);
        assert_eq!(bytes_to_mib_ceil(MIB + 1), 2);
        assert_eq!(bytes_to_mib_ceil(0), 0);
    }
}

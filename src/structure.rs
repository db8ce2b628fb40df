//! Useful macros for parsing big-endian on-card structures.

macro_rules! define_field {
    ($name:ident, u16, $offset:expr) => {
        /// Get the value from the $name field
        pub fn $name(&self) -> u16 {
            BigEndian::read_u16(&self.data[$offset..$offset + 2])
        }
    };

    ($name:ident, u32, $offset:expr) => {
        /// Get the $name field
        pub fn $name(&self) -> u32 {
            BigEndian::read_u32(&self.data[$offset..$offset + 4])
        }
    };

    ($name:ident, u64, $offset:expr) => {
        /// Get the $name field
        pub fn $name(&self) -> u64 {
            BigEndian::read_u64(&self.data[$offset..$offset + 8])
        }
    };

    ($name:ident, [u8; $len:expr], $offset:expr) => {
        /// Get the $name field
        pub fn $name(&self) -> [u8; $len] {
            let mut result = [0u8; $len];
            result.copy_from_slice(&self.data[$offset..$offset + $len]);
            result
        }
    };
}

// ****************************************************************************
//
// End Of File
//
// ****************************************************************************

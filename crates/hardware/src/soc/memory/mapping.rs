//! DRAM address mapping.
//!
//! Splits a physical address into channel, rank, bank group, bank, row and
//! column coordinates. The fields are contiguous bit slices, from the least
//! significant bit:
//!
//! ```text
//! | row | rank | column | bank | bankgroup | channel | offset |
//! ```
//!
//! Channel, bank group and bank are not read straight off the address: each is
//! XOR-folded ("swizzled") with slices of the row field so that sequential rows
//! spread over channels and banks instead of hammering one of them.

use crate::common::constants::BLOCK_SIZE;
use crate::common::{MappingError, PhysAddr};
use crate::config::DramConfig;

/// Decoded DRAM coordinates of one address.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct DramCoordinates {
    /// Channel index.
    pub channel: u64,
    /// Rank index within the channel.
    pub rank: u64,
    /// Bank group index within the rank.
    pub bankgroup: u64,
    /// Bank index within the bank group.
    pub bank: u64,
    /// Row index within the bank.
    pub row: u64,
    /// Column-burst index within the row.
    pub column: u64,
}

/// Bit-slicing address mapper, built once from the DRAM geometry.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AddressMapping {
    prefetch_size: u64,
    offset_bits: u32,
    channel_bits: u32,
    bankgroup_bits: u32,
    bank_bits: u32,
    column_bits: u32,
    rank_bits: u32,
    row_bits: u32,
}

/// Returns a mask of the low `bits` bits.
#[inline(always)]
const fn mask(bits: u32) -> u64 {
    if bits >= u64::BITS { u64::MAX } else { (1u64 << bits) - 1 }
}

/// Returns log2 of `value`, or an error if it is not a non-zero power of two.
fn lg2(field: &'static str, value: u64) -> Result<u32, MappingError> {
    if value.is_power_of_two() {
        Ok(value.trailing_zeros())
    } else {
        Err(MappingError::NotPowerOfTwo { field, value })
    }
}

impl AddressMapping {
    /// Builds a mapping from explicit geometry.
    ///
    /// # Arguments
    ///
    /// * `channel_width` - Bytes transferred per data-bus beat.
    /// * `prefetch_size` - Beats per burst; one burst must cover whole cache lines.
    /// * `channels`, `bankgroups`, `banks`, `columns`, `ranks`, `rows` - Geometry counts.
    ///
    /// # Errors
    ///
    /// Returns a [`MappingError`] if the prefetch size is zero, a burst is not a
    /// multiple of the line size, a count (or `columns / prefetch_size`) is not a
    /// non-zero power of two, or the fields need more than 64 address bits.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        channel_width: u64,
        prefetch_size: u64,
        channels: u64,
        bankgroups: u64,
        banks: u64,
        columns: u64,
        ranks: u64,
        rows: u64,
    ) -> Result<Self, MappingError> {
        if prefetch_size == 0 {
            return Err(MappingError::ZeroPrefetch);
        }
        let burst = channel_width * prefetch_size;
        if burst % BLOCK_SIZE != 0 {
            return Err(MappingError::PrefetchNotLineMultiple {
                channel_width,
                prefetch_size,
                line: BLOCK_SIZE,
            });
        }
        if columns % prefetch_size != 0 {
            return Err(MappingError::NotPowerOfTwo {
                field: "columns / prefetch",
                value: columns,
            });
        }

        let mapping = Self {
            prefetch_size,
            offset_bits: lg2("burst", burst)?,
            channel_bits: lg2("channels", channels)?,
            bankgroup_bits: lg2("bankgroups", bankgroups)?,
            bank_bits: lg2("banks", banks)?,
            column_bits: lg2("columns / prefetch", columns / prefetch_size)?,
            rank_bits: lg2("ranks", ranks)?,
            row_bits: lg2("rows", rows)?,
        };

        let bits = mapping.address_bits();
        if bits > u64::BITS {
            return Err(MappingError::AddressWidthExceeded { bits });
        }
        Ok(mapping)
    }

    /// Builds a mapping from a [`DramConfig`], deriving the prefetch size as
    /// line size divided by channel width.
    ///
    /// # Errors
    ///
    /// As [`AddressMapping::new`].
    pub fn from_config(config: &DramConfig) -> Result<Self, MappingError> {
        let prefetch_size = BLOCK_SIZE.checked_div(config.channel_width).unwrap_or(0);
        Self::new(
            config.channel_width,
            prefetch_size,
            config.channels,
            config.bankgroups,
            config.banks,
            config.columns,
            config.ranks,
            config.rows,
        )
    }

    #[inline(always)]
    const fn channel_shift(&self) -> u32 {
        self.offset_bits
    }

    #[inline(always)]
    const fn bankgroup_shift(&self) -> u32 {
        self.channel_shift() + self.channel_bits
    }

    #[inline(always)]
    const fn bank_shift(&self) -> u32 {
        self.bankgroup_shift() + self.bankgroup_bits
    }

    #[inline(always)]
    const fn column_shift(&self) -> u32 {
        self.bank_shift() + self.bank_bits
    }

    #[inline(always)]
    const fn rank_shift(&self) -> u32 {
        self.column_shift() + self.column_bits
    }

    #[inline(always)]
    const fn row_shift(&self) -> u32 {
        self.rank_shift() + self.rank_bits
    }

    #[inline(always)]
    const fn field(address: PhysAddr, shift: u32, bits: u32) -> u64 {
        if shift >= u64::BITS {
            0
        } else {
            (address.0 >> shift) & mask(bits)
        }
    }

    /// XOR-folds `field` with every `segment`-bit slice of the row, taking
    /// `field_bits` bits starting at `segment_offset` of each slice.
    fn swizzle_bits(&self, address: PhysAddr, segment: u32, segment_offset: u32, field: u64, field_bits: u32) -> u64 {
        if segment == 0 {
            return field;
        }
        let row = self.row(address);
        let mut permuted = field;
        let mut lower = 0;
        while lower + segment <= self.row_bits {
            let slice = (row >> lower) & mask(segment);
            permuted ^= (slice >> segment_offset) & mask(field_bits);
            lower += segment;
        }
        permuted
    }

    /// Returns the channel an address maps to.
    pub fn channel(&self, address: PhysAddr) -> u64 {
        let channel = Self::field(address, self.channel_shift(), self.channel_bits);
        self.swizzle_bits(address, 1, 0, channel, self.channel_bits)
    }

    /// Returns the rank an address maps to.
    pub const fn rank(&self, address: PhysAddr) -> u64 {
        Self::field(address, self.rank_shift(), self.rank_bits)
    }

    /// Returns the bank group an address maps to.
    pub fn bankgroup(&self, address: PhysAddr) -> u64 {
        let bankgroup = Self::field(address, self.bankgroup_shift(), self.bankgroup_bits);
        let segment = self.bankgroup_bits + self.bank_bits;
        self.swizzle_bits(address, segment, 0, bankgroup, self.bankgroup_bits)
    }

    /// Returns the bank (within its bank group) an address maps to.
    pub fn bank(&self, address: PhysAddr) -> u64 {
        let bank = Self::field(address, self.bank_shift(), self.bank_bits);
        let segment = self.bankgroup_bits + self.bank_bits;
        self.swizzle_bits(address, segment, self.bankgroup_bits, bank, self.bank_bits)
    }

    /// Returns the row an address maps to.
    pub const fn row(&self, address: PhysAddr) -> u64 {
        Self::field(address, self.row_shift(), self.row_bits)
    }

    /// Returns the column burst an address maps to.
    pub const fn column(&self, address: PhysAddr) -> u64 {
        Self::field(address, self.column_shift(), self.column_bits)
    }

    /// Decodes every coordinate of an address.
    pub fn map(&self, address: PhysAddr) -> DramCoordinates {
        DramCoordinates {
            channel: self.channel(address),
            rank: self.rank(address),
            bankgroup: self.bankgroup(address),
            bank: self.bank(address),
            row: self.row(address),
            column: self.column(address),
        }
    }

    /// Returns `true` if both addresses fall in the same DRAM burst, i.e. they
    /// differ only in the offset bits.
    pub const fn is_collision(&self, a: PhysAddr, b: PhysAddr) -> bool {
        if self.offset_bits >= u64::BITS {
            return true;
        }
        (a.0 >> self.offset_bits) == (b.0 >> self.offset_bits)
    }

    /// Beats per burst.
    pub const fn prefetch_size(&self) -> u64 {
        self.prefetch_size
    }

    /// Width of the offset field in bits.
    pub const fn offset_bits(&self) -> u32 {
        self.offset_bits
    }

    /// Total number of address bits the mapping consumes.
    pub const fn address_bits(&self) -> u32 {
        self.offset_bits
            + self.channel_bits
            + self.bankgroup_bits
            + self.bank_bits
            + self.column_bits
            + self.rank_bits
            + self.row_bits
    }

    /// Bytes addressable through this mapping.
    pub const fn size(&self) -> u64 {
        if self.address_bits() >= u64::BITS {
            u64::MAX
        } else {
            1 << self.address_bits()
        }
    }

    /// Rows per bank.
    pub const fn rows(&self) -> u64 {
        1 << self.row_bits
    }

    /// Columns per row.
    pub const fn columns(&self) -> u64 {
        self.prefetch_size << self.column_bits
    }

    /// Ranks per channel.
    pub const fn ranks(&self) -> u64 {
        1 << self.rank_bits
    }

    /// Bank groups per rank.
    pub const fn bankgroups(&self) -> u64 {
        1 << self.bankgroup_bits
    }

    /// Banks per bank group.
    pub const fn banks(&self) -> u64 {
        1 << self.bank_bits
    }

    /// Channels.
    pub const fn channels(&self) -> u64 {
        1 << self.channel_bits
    }
}

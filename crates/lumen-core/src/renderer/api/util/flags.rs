// Copyright 2025 eraflo
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Flags selecting which backbuffer aspects `clear_screen` targets.

/// Flags selecting which backbuffer aspects a clear targets.
///
/// Multiple aspects can be combined using bitwise operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClearFlags {
    bits: u32,
}

impl ClearFlags {
    /// Nothing is cleared.
    pub const NONE: Self = Self { bits: 0 };
    /// The color attachment.
    pub const COLOR: Self = Self { bits: 1 << 0 };
    /// The depth attachment.
    pub const DEPTH: Self = Self { bits: 1 << 1 };
    /// Color and depth.
    pub const ALL: Self = Self {
        bits: Self::COLOR.bits | Self::DEPTH.bits,
    };

    /// Creates a new set of flags from raw bits.
    pub const fn from_bits(bits: u32) -> Self {
        Self { bits }
    }

    /// Returns the raw bits.
    pub const fn bits(&self) -> u32 {
        self.bits
    }

    /// Combines two sets of flags.
    pub const fn union(self, other: Self) -> Self {
        Self {
            bits: self.bits | other.bits,
        }
    }

    /// Checks if these flags contain all of `other`.
    pub const fn contains(&self, other: Self) -> bool {
        (self.bits & other.bits) == other.bits
    }

    /// Checks if these flags are empty.
    pub const fn is_empty(&self) -> bool {
        self.bits == 0
    }
}

impl Default for ClearFlags {
    fn default() -> Self {
        Self::ALL
    }
}

impl std::ops::BitOr for ClearFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self::Output {
        self.union(rhs)
    }
}

impl std::ops::BitOrAssign for ClearFlags {
    fn bitor_assign(&mut self, rhs: Self) {
        *self = self.union(rhs);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn combining_flags() {
        let mut flags = ClearFlags::NONE;
        assert!(flags.is_empty());
        flags |= ClearFlags::COLOR;
        assert!(flags.contains(ClearFlags::COLOR));
        assert!(!flags.contains(ClearFlags::DEPTH));
        assert_eq!(flags | ClearFlags::DEPTH, ClearFlags::ALL);
        assert_eq!(ClearFlags::from_bits(3).bits(), ClearFlags::ALL.bits());
    }
}

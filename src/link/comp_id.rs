//! Bluetooth SIG company identifiers, as carried in `LL_VERSION_IND`.

/// A company identifier assigned by the Bluetooth SIG.
///
/// This is a thin newtype over the raw `u16` carried on the wire; the assigned-numbers list
/// itself lives outside this crate (see the [Bluetooth SIG company identifiers] document).
///
/// [Bluetooth SIG company identifiers]: https://www.bluetooth.com/specifications/assigned-numbers/company-identifiers
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct CompanyId(u16);

impl CompanyId {
    /// Wraps a raw company identifier value.
    pub const fn from_raw(raw: u16) -> Self {
        CompanyId(raw)
    }

    /// Returns the raw `u16` value of this company identifier.
    pub const fn as_u16(&self) -> u16 {
        self.0
    }
}

impl From<u16> for CompanyId {
    fn from(raw: u16) -> Self {
        CompanyId::from_raw(raw)
    }
}

//! In-place patching of worksheet text whose final value is only known at the end

use log::trace;

use crate::error::{XlsxError, XlsxResult};
use crate::package::EntryOutput;

/// A run of spaces reserved in an entry, to be overwritten once its content is known
///
/// Whitespace between elements is insignificant in the worksheet XML, so an unused tail
/// of the reservation is harmless.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PatchSite {
    position: u64,
    reserved: usize,
}

impl PatchSite {
    /// Write `width` spaces at the current position and remember where they are
    pub fn reserve<O: EntryOutput + ?Sized>(out: &mut O, width: usize) -> XlsxResult<Self> {
        if !out.is_patchable() {
            return Err(XlsxError::InvalidOptions(
                "deferred values need a patchable entry".into(),
            ));
        }
        let position = out.position()?;
        out.write_all(&vec![b' '; width])?;
        Ok(Self {
            position,
            reserved: width,
        })
    }

    /// Byte offset of the reservation within the entry
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Reserved byte width
    pub fn reserved(&self) -> usize {
        self.reserved
    }

    /// Overwrite the reservation with `text`, space-padded to the reserved width
    pub fn commit<O: EntryOutput + ?Sized>(self, out: &mut O, text: &str) -> XlsxResult<()> {
        let needed = text.len();
        if needed > self.reserved {
            return Err(XlsxError::PatchOverflow {
                reserved: self.reserved,
                needed,
            });
        }
        let mut bytes = Vec::with_capacity(self.reserved);
        bytes.extend_from_slice(text.as_bytes());
        bytes.resize(self.reserved, b' ');
        out.overwrite(self.position, &bytes)?;
        trace!(
            "patched {} of {} bytes at offset {}",
            needed,
            self.reserved,
            self.position
        );
        Ok(())
    }
}

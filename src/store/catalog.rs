//! The header block at the start of every store file.
//!
//! ```text
//! offset 0   magic  "PARIO\0\0\x01"
//! offset 8   u64 LE length of the encoded catalog
//! offset 16  bincode-encoded Catalog
//! ...        zero padding up to HEADER_CAPACITY
//! ```
//!
//! Dataset contents follow the header, one contiguous row-major region per dataset.

use crate::datatype::DataType;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{Read, Seek, SeekFrom, Write};

const MAGIC: &[u8; 8] = b"PARIO\0\0\x01";
const PREFIX_SIZE: u64 = 16;
pub(crate) const HEADER_CAPACITY: u64 = 64 * 1024;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub(crate) struct Catalog {
    pub datasets: Vec<DatasetRecord>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct DatasetRecord {
    pub name: String,
    pub data_type: DataType,
    pub shape: Vec<u64>,
    pub data_offset: u64,
    pub attributes: Vec<AttributeRecord>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct AttributeRecord {
    pub name: String,
    pub data_type: DataType,
    pub shape: Vec<u64>,
    pub value: Vec<u8>,
}

impl DatasetRecord {
    /// Bytes of the data region, or `None` if they do not fit in a `u64`.
    pub fn byte_len(&self) -> Option<u64> {
        self.shape
            .iter()
            .try_fold(self.data_type.size() as u64, |acc, &dim| acc.checked_mul(dim))
    }

    /// First byte after the data region.
    pub fn data_end(&self) -> Option<u64> {
        self.byte_len()?.checked_add(self.data_offset)
    }

    pub fn attribute(&self, name: &str) -> Option<&AttributeRecord> {
        self.attributes.iter().find(|a| a.name == name)
    }

    pub fn attribute_mut(&mut self, name: &str) -> Option<&mut AttributeRecord> {
        self.attributes.iter_mut().find(|a| a.name == name)
    }
}

impl Catalog {
    pub fn dataset(&self, name: &str) -> Option<&DatasetRecord> {
        self.datasets.iter().find(|d| d.name == name)
    }

    pub fn dataset_mut(&mut self, name: &str) -> Option<&mut DatasetRecord> {
        self.datasets.iter_mut().find(|d| d.name == name)
    }

    /// First byte after every allocated data region.
    pub fn end_of_data(&self) -> Result<u64> {
        self.datasets.iter().try_fold(HEADER_CAPACITY, |end, d| {
            d.data_end()
                .map(|data_end| end.max(data_end))
                .ok_or_else(|| {
                    Error::Catalog(format!("dataset {} ends past the largest file", d.name))
                })
        })
    }

    pub fn read_from(file: &File) -> Result<Self> {
        let mut prefix = [0u8; PREFIX_SIZE as usize];
        read_exact_at(file, &mut prefix, 0)?;
        if &prefix[..8] != MAGIC {
            return Err(Error::Catalog("not a store file".into()));
        }
        let mut len = [0u8; 8];
        len.copy_from_slice(&prefix[8..]);
        let len = u64::from_le_bytes(len);
        if len > HEADER_CAPACITY - PREFIX_SIZE {
            return Err(Error::Catalog(format!("catalog length {len} is corrupt")));
        }

        let mut encoded = vec![0u8; len as usize];
        read_exact_at(file, &mut encoded, PREFIX_SIZE)?;
        bincode::deserialize(&encoded).map_err(|e| Error::Catalog(e.to_string()))
    }

    pub fn write_to(&self, file: &File) -> Result<()> {
        let encoded = bincode::serialize(self).map_err(|e| Error::Catalog(e.to_string()))?;
        if encoded.len() as u64 > HEADER_CAPACITY - PREFIX_SIZE {
            return Err(Error::Catalog(format!(
                "catalog of {} bytes does not fit in the header",
                encoded.len()
            )));
        }

        let mut header = Vec::with_capacity(PREFIX_SIZE as usize + encoded.len());
        header.extend_from_slice(MAGIC);
        header.extend_from_slice(&(encoded.len() as u64).to_le_bytes());
        header.extend_from_slice(&encoded);
        write_all_at(file, &header, 0)?;
        file.sync_data()?;
        Ok(())
    }
}

pub(crate) fn read_exact_at(mut file: &File, buf: &mut [u8], offset: u64) -> Result<()> {
    file.seek(SeekFrom::Start(offset))?;
    file.read_exact(buf)?;
    Ok(())
}

pub(crate) fn write_all_at(mut file: &File, buf: &[u8], offset: u64) -> Result<()> {
    file.seek(SeekFrom::Start(offset))?;
    file.write_all(buf)?;
    Ok(())
}

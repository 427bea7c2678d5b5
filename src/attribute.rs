//! Named metadata values attached to datasets.
//!
//! An attribute is a small typed array (or scalar) stored next to a dataset's description in the
//! store catalog. It does not touch the dataset's contents.

use crate::datatype::{DataType, Element};
use crate::error::{Error, Result};
use crate::selection::Dataspace;
use crate::store::{AttributeRecord, Dataset};
use log::debug;

/// An attribute created on an open dataset, ready to be written.
pub struct Attribute<'d> {
    dataset: &'d Dataset<'d>,
    name: String,
    data_type: DataType,
    space: Dataspace,
}

impl<'f> Dataset<'f> {
    /// Create an attribute of element type `T` and shape `space` on this dataset.
    ///
    /// This is a collective operation. The attribute holds zeroes until it is written.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DuplicateName`] if the dataset already has an attribute called `name`.
    pub fn create_attribute<T: Element>(&self, name: &str, space: &Dataspace) -> Result<Attribute<'_>> {
        let dataset = self.name().to_string();
        let value_len = usize::try_from(space.element_count())
            .ok()
            .and_then(|count| count.checked_mul(T::DATA_TYPE.size()))
            .ok_or_else(|| {
                Error::InvalidConfig(format!(
                    "attribute {name} of {} {:?} is too large",
                    T::DATA_TYPE,
                    space.shape()
                ))
            })?;
        self.file().update_catalog(|catalog| {
            let record = catalog
                .dataset_mut(&dataset)
                .ok_or_else(|| Error::NotFound(dataset.clone()))?;
            if record.attribute(name).is_some() {
                return Err(Error::DuplicateName(format!("{dataset}/{name}")));
            }
            record.attributes.push(AttributeRecord {
                name: name.to_string(),
                data_type: T::DATA_TYPE,
                shape: space.shape().to_vec(),
                value: vec![0; value_len],
            });
            Ok(())
        })?;

        debug!("Created attribute {}/{}", dataset, name);
        Ok(Attribute {
            dataset: self,
            name: name.to_string(),
            data_type: T::DATA_TYPE,
            space: space.clone(),
        })
    }

    /// Names of this dataset's attributes, in creation order.
    pub fn attribute_names(&self) -> Result<Vec<String>> {
        let catalog = self.file().catalog()?;
        let record = catalog
            .dataset(self.name())
            .ok_or_else(|| Error::NotFound(self.name().to_string()))?;
        Ok(record.attributes.iter().map(|a| a.name.clone()).collect())
    }

    /// Read the attribute called `name`.
    pub fn read_attribute<T: Element>(&self, name: &str) -> Result<Vec<T>> {
        let catalog = self.file().catalog()?;
        let attribute = catalog
            .dataset(self.name())
            .and_then(|d| d.attribute(name))
            .ok_or_else(|| Error::NotFound(format!("{}/{}", self.name(), name)))?;
        if attribute.data_type != T::DATA_TYPE {
            return Err(Error::TypeMismatch {
                expected: attribute.data_type,
                found: T::DATA_TYPE,
            });
        }
        Ok(bytemuck::pod_collect_to_vec(&attribute.value))
    }

    /// Read the scalar attribute called `name`.
    pub fn read_scalar_attribute<T: Element>(&self, name: &str) -> Result<T> {
        match self.read_attribute::<T>(name)?.as_slice() {
            [value] => Ok(*value),
            values => Err(Error::SelectionMismatch(format!(
                "attribute {name} holds {} elements, not one",
                values.len()
            ))),
        }
    }
}

impl Attribute<'_> {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn dataspace(&self) -> &Dataspace {
        &self.space
    }

    /// Store `value`, which must fill the attribute's dataspace. This is a collective operation.
    pub fn write<T: Element>(&self, value: &[T]) -> Result<()> {
        if T::DATA_TYPE != self.data_type {
            return Err(Error::TypeMismatch {
                expected: self.data_type,
                found: T::DATA_TYPE,
            });
        }
        if value.len() as u64 != self.space.element_count() {
            return Err(Error::SelectionMismatch(format!(
                "attribute {} holds {} elements, got {}",
                self.name,
                self.space.element_count(),
                value.len()
            )));
        }

        let dataset = self.dataset.name();
        self.dataset.file().update_catalog(|catalog| {
            let attribute = catalog
                .dataset_mut(dataset)
                .and_then(|d| d.attribute_mut(&self.name))
                .ok_or_else(|| Error::NotFound(format!("{}/{}", dataset, self.name)))?;
            attribute.value = bytemuck::cast_slice(value).to_vec();
            Ok(())
        })?;
        debug!("Wrote attribute {}/{}", dataset, self.name);
        Ok(())
    }
}

impl Drop for Attribute<'_> {
    fn drop(&mut self) {
        debug!("Closing attribute {}/{}", self.dataset.name(), self.name);
    }
}

/// Attach a new attribute holding `value` to `dataset`.
pub fn attach<T: Element>(
    dataset: &Dataset<'_>,
    name: &str,
    space: &Dataspace,
    value: &[T],
) -> Result<()> {
    dataset.create_attribute::<T>(name, space)?.write(value)
}

/// Attach a new scalar attribute holding `value` to `dataset`.
pub fn attach_scalar<T: Element>(dataset: &Dataset<'_>, name: &str, value: T) -> Result<()> {
    attach(dataset, name, &Dataspace::scalar(), &[value])
}

use crate::rendering::texture::error::*;
use crate::rendering::texture::params::RawTextureParams;
use std::fmt::{Display, Formatter};

/// Which part of a texture an unordered access view covers, and how it may be accessed.
///
/// `num_slices` and `num_levels` of 0 mean "up to the end".
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct UavKey {
    pub first_slice: u32,
    pub num_slices: u32,
    pub first_level: u32,
    pub num_levels: u32,
    pub can_read: bool,
    pub can_write: bool,
}

impl Default for UavKey {
    fn default() -> Self {
        Self {
            first_slice: 0,
            num_slices: 0,
            first_level: 0,
            num_levels: 0,
            can_read: true,
            can_write: true,
        }
    }
}

impl UavKey {
    pub fn slices(mut self, first: u32, count: u32) -> Self {
        self.first_slice = first;
        self.num_slices = count;
        self
    }

    pub fn levels(mut self, first: u32, count: u32) -> Self {
        self.first_level = first;
        self.num_levels = count;
        self
    }

    pub fn read_only(mut self) -> Self {
        self.can_read = true;
        self.can_write = false;
        self
    }

    pub fn write_only(mut self) -> Self {
        self.can_read = false;
        self.can_write = true;
        self
    }

    /// Checks the key against `params` and fills in the open-ended ranges.
    pub fn validated(mut self, params: &RawTextureParams) -> Result<Self, TextureError> {
        if !self.can_read && !self.can_write {
            return InvalidUavKeyErr {
                reason: "the view can neither be read nor written",
            }
            .fail();
        }

        let slices = params.array_size;
        if self.first_slice >= slices {
            return InvalidUavKeyErr {
                reason: "first slice is out of range",
            }
            .fail();
        }
        if self.first_level >= params.num_levels_rtv {
            return InvalidUavKeyErr {
                reason: "first level is out of range",
            }
            .fail();
        }

        if self.num_slices == 0 {
            self.num_slices = slices - self.first_slice;
        }
        if self.num_levels == 0 {
            self.num_levels = params.num_levels_rtv - self.first_level;
        }

        if self.first_slice.checked_add(self.num_slices).is_none_or(|end| end > slices) {
            return InvalidUavKeyErr {
                reason: "slice range is out of range",
            }
            .fail();
        }
        if self.first_level.checked_add(self.num_levels).is_none_or(|end| end > params.num_levels_rtv) {
            return InvalidUavKeyErr {
                reason: "level range is out of range",
            }
            .fail();
        }

        Ok(self)
    }
}

impl Display for UavKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}-{}:{}-{}:{}{}",
            self.first_slice,
            self.first_slice as u64 + self.num_slices as u64,
            self.first_level,
            self.first_level as u64 + self.num_levels as u64,
            if self.can_read { 'r' } else { ' ' },
            if self.can_write { 'w' } else { ' ' },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rendering::defs::TextureType;
    use crate::rendering::device::HeadlessDevice;
    use crate::rendering::texture::params::validate_params;

    fn array_params(slices: u32) -> RawTextureParams {
        let mut params = RawTextureParams::builder()
            .ty(TextureType::Texture2DArray)
            .size((32, 32, 1))
            .array_size(slices)
            .build();
        validate_params(&mut params, &HeadlessDevice::new()).unwrap();
        params
    }

    #[test]
    fn open_ranges_reach_the_end() {
        let params = array_params(4);
        let key = UavKey::default().validated(&params).unwrap();
        assert_eq!(key.num_slices, 4);
        assert_eq!(key.num_levels, 6);

        let tail = UavKey::default().slices(1, 0).levels(2, 0).validated(&params).unwrap();
        assert_eq!((tail.num_slices, tail.num_levels), (3, 4));
    }

    #[test]
    fn out_of_range_keys_are_rejected() {
        let params = array_params(4);
        for key in [
            UavKey::default().slices(4, 0),
            UavKey::default().slices(2, 3),
            UavKey::default().levels(6, 0),
            UavKey::default().levels(1, 6),
            UavKey::default().slices(1, u32::MAX),
            UavKey::default().levels(1, u32::MAX),
            UavKey {
                can_read: false,
                can_write: false,
                ..UavKey::default()
            },
        ] {
            assert!(
                matches!(key.validated(&params), Err(TextureError::InvalidUavKey { .. })),
                "{key:?}"
            );
        }
    }

    #[test]
    fn label_names_the_range() {
        let key = UavKey::default().slices(1, 2).levels(0, 1).read_only();
        assert_eq!(key.to_string(), "1-3:0-1:r ");
        assert_eq!(UavKey::default().slices(0, 4).levels(0, 1).to_string(), "0-4:0-1:rw");
    }
}

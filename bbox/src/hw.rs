use crate::common::*;

/// Non-negative height and width.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HW<T> {
    pub(crate) h: T,
    pub(crate) w: T,
}

impl<T> HW<T>
where
    T: Num + PartialOrd + Copy,
{
    pub fn try_from_hw(hw: [T; 2]) -> Result<Self> {
        let [h, w] = hw;
        let zero = T::zero();
        ensure!(
            h >= zero && w >= zero,
            "height and width parameters must be non-negative"
        );
        Ok(Self { w, h })
    }

    pub fn from_hw(hw: [T; 2]) -> Self {
        Self::try_from_hw(hw).unwrap()
    }

    pub fn w(&self) -> T {
        self.w
    }

    pub fn h(&self) -> T {
        self.h
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn size_accessors() {
        let size = HW::from_hw([3.0, 2.0]);
        assert_eq!(size.h(), 3.0);
        assert_eq!(size.w(), 2.0);
    }

    #[test]
    fn size_rejects_negative() {
        assert!(HW::try_from_hw([-1, 2]).is_err());
    }
}

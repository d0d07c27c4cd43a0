use super::{Rect, TLBR};
use crate::{common::*, RectNum, HW};

/// Axis-aligned scaling followed by translation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Transform<T> {
    pub sy: T,
    pub sx: T,
    pub ty: T,
    pub tx: T,
}

impl<T> Transform<T>
where
    T: Copy + Num + PartialOrd,
{
    pub fn from_rects<R>(src: &R, tgt: &R) -> Self
    where
        R: Rect<Type = T>,
    {
        let sy = tgt.h() / src.h();
        let sx = tgt.w() / src.w();
        let ty = tgt.t() - src.t() * sy;
        let tx = tgt.l() - src.l() * sx;

        Self { sy, sx, ty, tx }
    }

    /// Maps a rectangle spanning `src_size` onto one spanning `tgt_size`.
    pub fn from_sizes_exact(src_size: HW<T>, tgt_size: HW<T>) -> Self {
        let src = TLBR::from_tlhw([T::zero(), T::zero(), src_size.h(), src_size.w()]);
        let tgt = TLBR::from_tlhw([T::zero(), T::zero(), tgt_size.h(), tgt_size.w()]);
        Self::from_rects(&src, &tgt)
    }

    /// Maps ratio coordinates onto pixel coordinates of an image with `size`.
    pub fn from_ratio_to_pixel(size: HW<T>) -> Self {
        Self::from_sizes_exact(HW::from_hw([T::one(), T::one()]), size)
    }
}

impl<T> Transform<T>
where
    T: Copy + Num + Neg<Output = T>,
{
    pub fn inverse(&self) -> Self {
        let sy = T::one() / self.sy;
        let sx = T::one() / self.sx;
        let ty = -self.ty / self.sy;
        let tx = -self.tx / self.sx;

        Self { sy, sx, ty, tx }
    }
}

impl<T> Mul<&TLBR<T>> for &Transform<T>
where
    T: Copy + Num,
{
    type Output = TLBR<T>;

    fn mul(self, rhs: &TLBR<T>) -> Self::Output {
        rhs.transform(self)
    }
}

impl<T> Mul<&Transform<T>> for &Transform<T>
where
    T: Copy + Num,
{
    type Output = Transform<T>;

    fn mul(self, rhs: &Transform<T>) -> Self::Output {
        Transform {
            sx: self.sx * rhs.sx,
            sy: self.sy * rhs.sy,
            tx: rhs.tx * self.sx + self.tx,
            ty: rhs.ty * self.sy + self.ty,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rect_transform_inverse() {
        let orig = Transform {
            sx: 2.0,
            sy: 2.0,
            tx: 1.0,
            ty: 1.0,
        };
        assert_eq!(orig.inverse().inverse(), orig);
    }

    #[test]
    fn rect_resize_exact() {
        let transform =
            Transform::from_sizes_exact(HW::from_hw([80.0, 80.0]), HW::from_hw([20.0, 40.0]));
        let expect = Transform {
            sx: 0.5,
            sy: 0.25,
            tx: 0.0,
            ty: 0.0,
        };
        assert_eq!(transform, expect);
    }

    #[test]
    fn ratio_box_to_pixels() {
        let transform = Transform::from_ratio_to_pixel(HW::from_hw([300.0, 400.0]));
        let ratio = TLBR::from_tlbr([0.125, 0.25, 0.5, 0.75]);
        let pixel = &transform * &ratio;
        assert_eq!(pixel.tlbr(), [37.5, 100.0, 150.0, 300.0]);
    }

    #[test]
    fn transform_composition() {
        let a = Transform {
            sx: 2.0,
            sy: 3.0,
            tx: 1.0,
            ty: -1.0,
        };
        let b = Transform {
            sx: 0.5,
            sy: 0.5,
            tx: 4.0,
            ty: 2.0,
        };
        let rect = TLBR::from_tlbr([1.0, 2.0, 3.0, 4.0]);
        let lhs = &(&a * &b) * &rect;
        let rhs = &a * &(&b * &rect);
        assert_eq!(lhs, rhs);
    }
}

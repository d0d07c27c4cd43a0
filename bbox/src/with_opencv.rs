use crate::{common::*, Rect, TLBR};
use opencv::core as core_cv;

impl<T> From<&TLBR<T>> for core_cv::Rect_<T>
where
    T: Num + Copy + PartialOrd,
{
    fn from(from: &TLBR<T>) -> Self {
        Self {
            x: from.l(),
            y: from.t(),
            width: from.w(),
            height: from.h(),
        }
    }
}

impl<T> From<TLBR<T>> for core_cv::Rect_<T>
where
    T: Num + Copy + PartialOrd,
{
    fn from(from: TLBR<T>) -> Self {
        (&from).into()
    }
}

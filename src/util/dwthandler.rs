/**
Number arithmetic a [DwtHandler] is specialized with: lazy modular arithmetic
for the NTT over each RNS limb, double-precision complex arithmetic for the
canonical embedding of the encoder.
*/
pub trait Arithmetic: Clone {

    type Value;
    type Root;
    type Scalar;

    fn add(&self, a: &Self::Value, b: &Self::Value) -> Self::Value;
    fn sub(&self, a: &Self::Value, b: &Self::Value) -> Self::Value;
    fn mul_root(&self, a: &Self::Value, r: &Self::Root) -> Self::Value;
    fn mul_scalar(&self, a: &Self::Value, s: &Self::Scalar) -> Self::Value;
    /// Brings a lazily reduced value back into the range the butterflies expect.
    fn guard(&self, a: &Self::Value) -> Self::Value;

}

/**
Fast discrete weighted transform and its inverse, following algorithms 1
and 2 of Longa and Naehrig (<https://eprint.iacr.org/2016/504.pdf>).

The forward transform reads roots in bit-reversed order and produces
bit-reversed output. The inverse consumes bit-reversed input; its roots are
stored so that slot i holds the (reverse_bits(i - 1, log_n) + 1)-th power of
the inverse root, which lets both transforms walk the table front to back.
*/
#[derive(Clone, Default)]
pub struct DwtHandler<A: Arithmetic> {
    arithmetic: A
}

impl<A: Arithmetic> DwtHandler<A> {

    pub fn new(arithmetic: A) -> Self {
        Self { arithmetic }
    }

    /// Cooley-Tukey butterflies, natural order in, bit-reversed order out.
    pub fn transform_to_rev(
        &self,
        values: &mut [A::Value],
        log_n: usize,
        roots: &[A::Root],
        scalar: Option<&A::Scalar>
    ) {
        let n = 1 << log_n;
        debug_assert_eq!(values.len(), n);
        let arith = &self.arithmetic;
        for layer in 0..log_n {
            let m = 1 << layer;
            let gap = n >> (layer + 1);
            for (block, r) in values.chunks_exact_mut(2 * gap).zip(&roots[m..2 * m]) {
                let (left, right) = block.split_at_mut(gap);
                for (x, y) in left.iter_mut().zip(right.iter_mut()) {
                    let u = arith.guard(x);
                    let v = arith.mul_root(y, r);
                    *x = arith.add(&u, &v);
                    *y = arith.sub(&u, &v);
                }
            }
        }
        if let Some(scalar) = scalar {
            values.iter_mut().for_each(|value| *value = arith.mul_scalar(value, scalar));
        }
    }

    /// Gentleman-Sande butterflies, bit-reversed order in, natural order out.
    pub fn transform_from_rev(
        &self,
        values: &mut [A::Value],
        log_n: usize,
        roots: &[A::Root],
        scalar: Option<&A::Scalar>
    ) {
        let n = 1 << log_n;
        debug_assert_eq!(values.len(), n);
        let arith = &self.arithmetic;
        for layer in 0..log_n {
            let gap = 1 << layer;
            let m = n >> (layer + 1);
            for (block, r) in values.chunks_exact_mut(2 * gap).zip(&roots[n - 2 * m + 1..n - m + 1]) {
                let (left, right) = block.split_at_mut(gap);
                for (x, y) in left.iter_mut().zip(right.iter_mut()) {
                    let u = arith.guard(&arith.add(x, y));
                    let v = arith.sub(x, y);
                    *x = u;
                    *y = arith.mul_root(&v, r);
                }
            }
        }
        if let Some(scalar) = scalar {
            values.iter_mut().for_each(|value| *value = arith.mul_scalar(value, scalar));
        }
    }

}

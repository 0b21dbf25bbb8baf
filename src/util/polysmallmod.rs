//! Coefficient-wise arithmetic over RNS polynomials.
//!
//! A polynomial with `k` limbs is a flat slice of `k * degree` words, limb
//! after limb. Functions suffixed `_p` act on one such polynomial, `_ps`
//! on `pcount` polynomials stored back to back. Limbs are independent, so
//! the `_p` forms run them on the rayon pool.

use itertools::izip;
use rayon::prelude::*;

use crate::Modulus;
use crate::util::{self, MultiplyU64ModOperand, NTTTables};

pub fn negate_inplace(component: &mut [u64], modulus: &Modulus) {
    let modulus = modulus.value();
    component.iter_mut().for_each(|c| *c = if *c != 0 {modulus - *c} else {0});
}

pub fn negate_inplace_p(poly: &mut [u64], degree: usize, moduli: &[Modulus]) {
    poly.par_chunks_mut(degree).zip(moduli.par_iter())
        .for_each(|(c, m)| negate_inplace(c, m));
}

pub fn negate_inplace_ps(polys: &mut [u64], pcount: usize, degree: usize, moduli: &[Modulus]) {
    polys.chunks_mut(degree * moduli.len()).take(pcount)
        .for_each(|p| negate_inplace_p(p, degree, moduli));
}

pub fn add_inplace(comp1: &mut [u64], comp2: &[u64], modulus: &Modulus) {
    comp1.iter_mut().zip(comp2).for_each(|(a, &b)| *a = util::add_u64_mod(*a, b, modulus));
}

pub fn add_inplace_p(poly1: &mut [u64], poly2: &[u64], degree: usize, moduli: &[Modulus]) {
    poly1.par_chunks_mut(degree).zip(poly2.par_chunks(degree)).zip(moduli.par_iter())
        .for_each(|((a, b), m)| add_inplace(a, b, m));
}

pub fn add_inplace_ps(polys1: &mut [u64], polys2: &[u64], pcount: usize, degree: usize, moduli: &[Modulus]) {
    let d = degree * moduli.len();
    for (p1, p2) in polys1.chunks_mut(d).zip(polys2.chunks(d)).take(pcount) {
        add_inplace_p(p1, p2, degree, moduli);
    }
}

/// Adds `scalars[i]` to every coefficient of limb i.
pub fn add_scalars_inplace_p(poly: &mut [u64], scalars: &[u64], degree: usize, moduli: &[Modulus]) {
    poly.par_chunks_mut(degree).zip(scalars.par_iter()).zip(moduli.par_iter())
        .for_each(|((c, &s), m)| c.iter_mut().for_each(|x| *x = util::add_u64_mod(*x, s, m)));
}

pub fn sub_inplace(comp1: &mut [u64], comp2: &[u64], modulus: &Modulus) {
    comp1.iter_mut().zip(comp2).for_each(|(a, &b)| *a = util::sub_u64_mod(*a, b, modulus));
}

pub fn sub_inplace_p(poly1: &mut [u64], poly2: &[u64], degree: usize, moduli: &[Modulus]) {
    poly1.par_chunks_mut(degree).zip(poly2.par_chunks(degree)).zip(moduli.par_iter())
        .for_each(|((a, b), m)| sub_inplace(a, b, m));
}

pub fn sub_inplace_ps(polys1: &mut [u64], polys2: &[u64], pcount: usize, degree: usize, moduli: &[Modulus]) {
    let d = degree * moduli.len();
    for (p1, p2) in polys1.chunks_mut(d).zip(polys2.chunks(d)).take(pcount) {
        sub_inplace_p(p1, p2, degree, moduli);
    }
}

pub fn dyadic_product_inplace(comp1: &mut [u64], comp2: &[u64], modulus: &Modulus) {
    comp1.iter_mut().zip(comp2).for_each(|(a, &b)| *a = util::multiply_u64_mod(*a, b, modulus));
}

pub fn dyadic_product_inplace_p(poly1: &mut [u64], poly2: &[u64], degree: usize, moduli: &[Modulus]) {
    poly1.par_chunks_mut(degree).zip(poly2.par_chunks(degree)).zip(moduli.par_iter())
        .for_each(|((a, b), m)| dyadic_product_inplace(a, b, m));
}

/// result = poly1 * poly2, coefficient-wise per limb.
pub fn dyadic_product_p(poly1: &[u64], poly2: &[u64], degree: usize, moduli: &[Modulus], result: &mut [u64]) {
    result.par_chunks_mut(degree).zip(poly1.par_chunks(degree)).zip(poly2.par_chunks(degree)).zip(moduli.par_iter())
        .for_each(|(((r, a), b), m)| {
            for (r, &a, &b) in izip!(r.iter_mut(), a, b) {
                *r = util::multiply_u64_mod(a, b, m);
            }
        });
}

/// result += poly1 * poly2, coefficient-wise per limb.
pub fn dyadic_product_accumulate_p(poly1: &[u64], poly2: &[u64], degree: usize, moduli: &[Modulus], result: &mut [u64]) {
    result.par_chunks_mut(degree).zip(poly1.par_chunks(degree)).zip(poly2.par_chunks(degree)).zip(moduli.par_iter())
        .for_each(|(((r, a), b), m)| {
            for (r, &a, &b) in izip!(r.iter_mut(), a, b) {
                *r = util::add_u64_mod(*r, util::multiply_u64_mod(a, b, m), m);
            }
        });
}

pub fn multiply_operand_inplace(comp: &mut [u64], scalar: &MultiplyU64ModOperand, modulus: &Modulus) {
    comp.iter_mut().for_each(|c| *c = util::multiply_u64operand_mod(*c, scalar, modulus));
}

/// Multiplies limb i by `scalars[i]`.
pub fn multiply_operands_inplace_p(poly: &mut [u64], scalars: &[MultiplyU64ModOperand], degree: usize, moduli: &[Modulus]) {
    poly.par_chunks_mut(degree).zip(scalars.par_iter()).zip(moduli.par_iter())
        .for_each(|((c, s), m)| multiply_operand_inplace(c, s, m));
}

pub fn ntt_inplace_p(poly: &mut [u64], degree: usize, tables: &[NTTTables]) {
    poly.par_chunks_mut(degree).zip(tables.par_iter())
        .for_each(|(c, t)| t.ntt_negacyclic_harvey(c));
}

pub fn intt_inplace_p(poly: &mut [u64], degree: usize, tables: &[NTTTables]) {
    poly.par_chunks_mut(degree).zip(tables.par_iter())
        .for_each(|(c, t)| t.inverse_ntt_negacyclic_harvey(c));
}

#[cfg(test)]
mod tests {
    use super::*;

    fn moduli() -> Vec<Modulus> {
        vec![Modulus::new(17).unwrap(), Modulus::new(97).unwrap()]
    }

    #[test]
    fn test_add_sub_negate() {
        let moduli = moduli();
        let mut a = vec![1, 16, 0, 5, 90, 96, 0, 1];
        let b = vec![16, 1, 0, 13, 7, 1, 96, 0];
        add_inplace_p(&mut a, &b, 4, &moduli);
        assert_eq!(a, vec![0, 0, 0, 1, 0, 0, 96, 1]);
        sub_inplace_p(&mut a, &b, 4, &moduli);
        assert_eq!(a, vec![1, 16, 0, 5, 90, 96, 0, 1]);
        negate_inplace_p(&mut a, 4, &moduli);
        assert_eq!(a, vec![16, 1, 0, 12, 7, 1, 0, 96]);
    }

    #[test]
    fn test_ps_forms_walk_every_polynomial() {
        let moduli = moduli();
        let mut polys = vec![1; 16];
        let ones = vec![1; 16];
        add_inplace_ps(&mut polys, &ones, 2, 4, &moduli);
        assert_eq!(polys, vec![2; 16]);
        negate_inplace_ps(&mut polys, 2, 4, &moduli);
        assert_eq!(&polys[..4], &[15; 4]);
        assert_eq!(&polys[12..], &[95; 4]);
        sub_inplace_ps(&mut polys, &ones, 2, 4, &moduli);
        assert_eq!(&polys[8..12], &[14; 4]);
    }

    #[test]
    fn test_dyadic_and_scalars() {
        let moduli = moduli();
        let a = vec![2, 3, 4, 5, 10, 20, 30, 40];
        let b = vec![9, 6, 5, 4, 10, 5, 4, 3];
        let mut r = vec![0; 8];
        dyadic_product_p(&a, &b, 4, &moduli, &mut r);
        assert_eq!(r, vec![1, 1, 3, 3, 3, 3, 23, 23]);
        dyadic_product_accumulate_p(&a, &b, 4, &moduli, &mut r);
        assert_eq!(r, vec![2, 2, 6, 6, 6, 6, 46, 46]);

        let mut c = a.clone();
        dyadic_product_inplace_p(&mut c, &b, 4, &moduli);
        assert_eq!(c, vec![1, 1, 3, 3, 3, 3, 23, 23]);

        let scalars = [MultiplyU64ModOperand::new(2, &moduli[0]), MultiplyU64ModOperand::new(3, &moduli[1])];
        let mut c = a.clone();
        multiply_operands_inplace_p(&mut c, &scalars, 4, &moduli);
        assert_eq!(c, vec![4, 6, 8, 10, 30, 60, 90, 23]);

        let mut c = a.clone();
        add_scalars_inplace_p(&mut c, &[15, 90], 4, &moduli);
        assert_eq!(c, vec![0, 1, 2, 3, 3, 13, 23, 33]);
    }

    #[test]
    fn test_ntt_roundtrip_p() {
        let moduli = crate::CoeffModulus::create(8, &[20, 30]).unwrap();
        let tables = NTTTables::create_ntt_tables(3, &moduli).unwrap();
        let original: Vec<u64> = (0..16).collect();
        let mut poly = original.clone();
        ntt_inplace_p(&mut poly, 8, &tables);
        assert_ne!(poly, original);
        intt_inplace_p(&mut poly, 8, &tables);
        assert_eq!(poly, original);
    }
}

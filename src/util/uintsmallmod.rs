use crate::modulus::Modulus;

/** `operand` must be at most modulus */
#[inline]
pub fn negate_u64_mod(operand: u64, modulus: &Modulus) -> u64 {
    if operand == 0 {0} else {modulus.value() - operand}
}

/** Both operands must be below modulus. */
#[inline]
pub fn add_u64_mod(operand1: u64, operand2: u64, modulus: &Modulus) -> u64 {
    let sum = operand1 + operand2;
    if sum >= modulus.value() {sum - modulus.value()} else {sum}
}

/** Both operands must be below modulus. */
#[inline]
pub fn sub_u64_mod(operand1: u64, operand2: u64, modulus: &Modulus) -> u64 {
    let (diff, borrow) = operand1.overflowing_sub(operand2);
    if borrow {diff.wrapping_add(modulus.value())} else {diff}
}

/**
Reduces a 128-bit input with base 2^64 Barrett reduction, using the
precomputed floor(2^128 / modulus) stored in the modulus.
*/
#[inline]
pub fn barrett_reduce_u128(input: u128, modulus: &Modulus) -> u64 {
    let x0 = input as u64;
    let x1 = (input >> 64) as u64;
    let ratio = modulus.const_ratio();
    let (r0, r1) = (ratio[0], ratio[1]);

    // Round 1
    let carry = ((x0 as u128 * r0 as u128) >> 64) as u64;
    let t = x0 as u128 * r1 as u128 + carry as u128;
    let (t_lo, t_hi) = (t as u64, (t >> 64) as u64);

    // Round 2
    let carry = ((x1 as u128 * r0 as u128 + t_lo as u128) >> 64) as u64;
    let quotient = x1.wrapping_mul(r1).wrapping_add(t_hi).wrapping_add(carry);

    let p = modulus.value();
    let r = x0.wrapping_sub(quotient.wrapping_mul(p));
    if r >= p {r - p} else {r}
}

#[inline]
pub fn barrett_reduce_u64(input: u64, modulus: &Modulus) -> u64 {
    // floor(2^64 / mod) == floor( floor(2^128 / mod) / 2^64 )
    let quotient = ((input as u128 * modulus.const_ratio()[1] as u128) >> 64) as u64;
    let p = modulus.value();
    let r = input.wrapping_sub(quotient.wrapping_mul(p));
    if r >= p {r - p} else {r}
}

#[inline]
pub fn multiply_u64_mod(operand1: u64, operand2: u64, modulus: &Modulus) -> u64 {
    barrett_reduce_u128(operand1 as u128 * operand2 as u128, modulus)
}

/**
An operand with its Shoup quotient floor((operand << 64) / modulus).
Multiplying by it with [multiply_u64operand_mod] avoids the full Barrett step.
Operand must be less than modulus.
*/
#[derive(Clone, Copy, Debug, Default)]
pub struct MultiplyU64ModOperand {
    pub operand: u64,
    pub quotient: u64,
}

impl MultiplyU64ModOperand {

    pub fn new(operand: u64, modulus: &Modulus) -> Self {
        let quotient = (((operand as u128) << 64) / modulus.value() as u128) as u64;
        MultiplyU64ModOperand { operand, quotient }
    }

}

impl std::fmt::Display for MultiplyU64ModOperand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {})", self.operand, self.quotient)
    }
}

/**
Returns x * y mod modulus.
Correctness: modulus should be at most 63-bit, and y must be less than modulus.
*/
#[inline]
pub fn multiply_u64operand_mod(x: u64, y: &MultiplyU64ModOperand, modulus: &Modulus) -> u64 {
    let p = modulus.value();
    let r = multiply_u64operand_mod_lazy(x, y, modulus);
    if r >= p {r - p} else {r}
}

/**
Returns x * y mod modulus, possibly plus modulus: the result lies in [0, 2 * modulus).
*/
#[inline]
pub fn multiply_u64operand_mod_lazy(x: u64, y: &MultiplyU64ModOperand, modulus: &Modulus) -> u64 {
    let high = ((x as u128 * y.quotient as u128) >> 64) as u64;
    y.operand.wrapping_mul(x).wrapping_sub(high.wrapping_mul(modulus.value()))
}

pub fn exponentiate_u64_mod(operand: u64, mut exponent: u64, modulus: &Modulus) -> u64 {
    if exponent == 0 {return 1;}
    if exponent == 1 {return operand;}
    let mut power = operand;
    let mut product = 1;
    loop {
        if exponent & 1 > 0 {
            product = multiply_u64_mod(product, power, modulus);
        }
        exponent >>= 1;
        if exponent == 0 {break;}
        power = multiply_u64_mod(power, power, modulus);
    }
    product
}

/// Inverse of `value` modulo `modulus`, if it exists.
pub fn try_invert_u64_mod(value: u64, modulus: &Modulus) -> Option<u64> {
    super::try_invert_u64_mod_u64(value, modulus.value())
}

/// Sum of the pairwise products, reduced once at the end.
pub fn dot_product_mod(operand1: &[u64], operand2: &[u64], modulus: &Modulus) -> u64 {
    let mut accumulator = 0u128;
    for (&x, &y) in operand1.iter().zip(operand2) {
        accumulator += x as u128 * y as u128;
        // Each term is below 2^122, so reduce before the sum can overflow.
        if accumulator >> 125 != 0 {
            accumulator = barrett_reduce_u128(accumulator, modulus) as u128;
        }
    }
    barrett_reduce_u128(accumulator, modulus)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn m(value: u64) -> Modulus {
        Modulus::new(value).unwrap()
    }

    #[test]
    fn test_negate_add_sub() {
        let modulus = m(0xFFFFFFFFFFFFFFF);
        assert_eq!(negate_u64_mod(0, &modulus), 0);
        assert_eq!(negate_u64_mod(1, &modulus), 0xFFFFFFFFFFFFFFE);
        assert_eq!(add_u64_mod(0xFFFFFFFFFFFFFFE, 1, &modulus), 0);
        assert_eq!(add_u64_mod(0xFFFFFFFFFFFFFFE, 0xFFFFFFFFFFFFFFE, &modulus), 0xFFFFFFFFFFFFFFD);
        assert_eq!(sub_u64_mod(0, 1, &modulus), 0xFFFFFFFFFFFFFFE);
        assert_eq!(sub_u64_mod(7, 5, &modulus), 2);
    }

    #[test]
    fn test_barrett_reduce() {
        let modulus = m(2);
        assert_eq!(barrett_reduce_u128(0, &modulus), 0);
        assert_eq!(barrett_reduce_u128(1, &modulus), 1);
        assert_eq!(barrett_reduce_u128(0xFFFFFFFFFFFFFFFF, &modulus), 1);

        let modulus = m(0x1000000000000000);
        assert_eq!(barrett_reduce_u128(0xFFFFFFFFFFFFFFFF, &modulus), 0xFFFFFFFFFFFFFFF);
        assert_eq!(barrett_reduce_u128(u128::MAX, &modulus), 0xFFFFFFFFFFFFFFF);

        let modulus = m(0xFFFFFFFFC001);
        assert_eq!(barrett_reduce_u128(0x1234567890ABCDEF, &modulus), 0x1234567890ABCDEF % 0xFFFFFFFFC001);
        let big = 0x0FFFFFFFFFFFFFFF_FFFFFFFFFFFFFFFFu128;
        assert_eq!(barrett_reduce_u128(big, &modulus) as u128, big % 0xFFFFFFFFC001);
        assert_eq!(barrett_reduce_u64(u64::MAX, &modulus), u64::MAX % 0xFFFFFFFFC001);
    }

    #[test]
    fn test_multiply_mod() {
        let modulus = m(0xFFFFFFFFFFFFFFF);
        assert_eq!(multiply_u64_mod(0, 0, &modulus), 0);
        assert_eq!(multiply_u64_mod(1, 1, &modulus), 1);
        assert_eq!(multiply_u64_mod(0xFFFFFFFFFFFFFFE, 0xFFFFFFFFFFFFFFE, &modulus), 1);

        let y = MultiplyU64ModOperand::new(0xFFFFFFFFFFFFFFE, &modulus);
        assert_eq!(multiply_u64operand_mod(0xFFFFFFFFFFFFFFE, &y, &modulus), 1);
        let lazy = multiply_u64operand_mod_lazy(12345, &y, &modulus);
        assert_eq!(lazy % modulus.value(), multiply_u64_mod(12345, 0xFFFFFFFFFFFFFFE, &modulus));
        assert!(lazy < 2 * modulus.value());
    }

    #[test]
    fn test_exponentiate_and_invert() {
        let modulus = m(5);
        assert_eq!(exponentiate_u64_mod(1, 0, &modulus), 1);
        assert_eq!(exponentiate_u64_mod(2, 4, &modulus), 1);
        assert_eq!(exponentiate_u64_mod(3, 3, &modulus), 2);

        let modulus = m(19);
        assert_eq!(try_invert_u64_mod(5, &modulus), Some(4));
        assert_eq!(try_invert_u64_mod(0, &modulus), None);
    }

    #[test]
    fn test_dot_product() {
        let modulus = m(0xFFFFFFFFFFFFFFF);
        let a = vec![0xFFFFFFFFFFFFFFE; 64];
        let b = vec![0xFFFFFFFFFFFFFFE; 64];
        assert_eq!(dot_product_mod(&a, &b, &modulus), 64);
    }
}

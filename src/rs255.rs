//! Reed–Solomon (255,223) over GF(256) — the on-page error-correcting code.
//!
//! # Field and code parameters
//! These match the original PaperBack format (credited in `paperbak.h` to
//! Phil Karn's public-domain RS library) and are frozen: a mismatched
//! primitive element or first consecutive root silently breaks interop with
//! existing printouts (`spec.md` §9).
//!
//! - Field generator polynomial: `x^8 + x^4 + x^3 + x^2 + 1` (`0x11D`)
//! - Primitive element: `α = 2`
//! - First consecutive root: `112`
//! - Root (generator) step: `11`
//! - Code length `n = 255`, message length `k = 223`, parity `2t = 32`
//!
//! The block format uses a *shortened* code: callers always pass a 96-byte
//! buffer (`addr + data + crc`) that is conceptually left-padded with
//! `223 - 96 = 127` zero bytes to reach the full 223-byte message length.
//! `encode` and `decode` both apply that virtual padding internally so
//! callers never allocate the padding themselves.

const FIELD_GEN: u16 = 0x11D;
const GF_SIZE: usize = 256;
const PRIM_ELEM: u8 = 2;
const FCR: usize = 112; // first consecutive root
const PRIM_STEP: usize = 11; // root step ("prim" in Karn's rs.c)

/// Parity length in bytes.
pub const PARITY_LEN: usize = 32;
/// Full (unshortened) codeword length.
pub const N: usize = 255;
/// Full (unshortened) message length.
pub const K: usize = N - PARITY_LEN;

/// log / antilog tables over GF(256) generated by `FIELD_GEN`/`PRIM_ELEM`.
struct GaloisField {
    exp: [u8; 512], // doubled so exp[i] wraps without a modulo on lookups
    log: [u16; GF_SIZE],
}

impl GaloisField {
    fn new() -> Self {
        let mut exp = [0u8; 512];
        let mut log = [0u16; GF_SIZE];
        let mut x: u16 = 1;
        for i in 0..255usize {
            exp[i] = x as u8;
            log[x as usize] = i as u16;
            x <<= 1;
            if x & 0x100 != 0 {
                x ^= FIELD_GEN;
            }
        }
        for i in 255..512 {
            exp[i] = exp[i - 255];
        }
        log[0] = 255; // never looked up for a nonzero value; placeholder
        Self { exp, log }
    }

    #[inline]
    fn mul(&self, a: u8, b: u8) -> u8 {
        if a == 0 || b == 0 {
            return 0;
        }
        let l = self.log[a as usize] as usize + self.log[b as usize] as usize;
        self.exp[l]
    }

    #[inline]
    fn inv(&self, a: u8) -> u8 {
        debug_assert!(a != 0);
        self.exp[255 - self.log[a as usize] as usize]
    }

    #[inline]
    fn pow_alpha(&self, e: i32) -> u8 {
        let e = e.rem_euclid(255) as usize;
        self.exp[e]
    }
}

fn gf() -> &'static GaloisField {
    use std::sync::OnceLock;
    static GF: OnceLock<GaloisField> = OnceLock::new();
    GF.get_or_init(GaloisField::new)
}

/// Generator polynomial coefficients `g(x) = prod_{i=0}^{2t-1} (x - α^(FCR+i*PRIM_STEP))`,
/// highest degree first, `g[0] == 1`.
fn generator_poly() -> [u8; PARITY_LEN + 1] {
    let gf = gf();
    let mut g = [0u8; PARITY_LEN + 1];
    g[PARITY_LEN] = 1;
    let mut degree = 0usize;
    for i in 0..PARITY_LEN {
        let root = gf.pow_alpha((FCR + i * PRIM_STEP) as i32);
        degree += 1;
        // Multiply current g (degree `degree-1`, stored right-aligned in g)
        // by (x - root) = (x + root) in GF(2^m).
        let start = PARITY_LEN - degree;
        for j in start..PARITY_LEN {
            g[j] = g[j + 1] ^ gf.mul(g[j], root);
        }
        g[PARITY_LEN] = gf.mul(g[PARITY_LEN], root);
    }
    g
}

/// Encode `data` (at most `K` bytes; conceptually left-padded with zeros to
/// `K` bytes) and return the `PARITY_LEN`-byte parity.
///
/// This is a systematic shortened encoder: the parity is computed as if
/// `data` were right-justified in a `K`-byte message with leading zero pad.
pub fn encode(data: &[u8]) -> [u8; PARITY_LEN] {
    assert!(data.len() <= K, "RS message too long: {} > {K}", data.len());
    let gf = gf();
    let g = generator_poly();
    let mut parity = [0u8; PARITY_LEN];

    for &byte in data {
        let feedback = byte ^ parity[0];
        for j in 0..PARITY_LEN - 1 {
            parity[j] = parity[j + 1] ^ gf.mul(feedback, g[PARITY_LEN - 1 - j]);
        }
        parity[PARITY_LEN - 1] = gf.mul(feedback, g[0]);
    }
    parity
}

/// Result of [`decode`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeOutcome {
    /// Codeword was already correct (no errors).
    NoErrors,
    /// Corrected this many symbols (sum of errors + filled erasures).
    Corrected(usize),
    /// Uncorrectable: the error+erasure budget was exceeded.
    Failure,
}

/// Decode a systematic shortened codeword in place.
///
/// `data` holds `data.len() <= K` message bytes followed immediately by
/// `PARITY_LEN` parity bytes (i.e. the non-padded, "shortened" view of the
/// 255-byte codeword — the virtual zero padding never needs to be materialized
/// because zero symbols cannot be in error without violating the erasure
/// contract the caller already declared).
///
/// `erasures` lists zero-based byte positions within `data` (message or
/// parity) known to be unreliable. At most `PARITY_LEN` total erasures may be
/// supplied, and `2*e_errors + erasures.len() <= PARITY_LEN` must hold for
/// correction to succeed (`2t + e <= 32`).
///
/// Returns the number of symbols actually altered, or `DecodeOutcome::Failure`
/// if the codeword could not be corrected. On failure `data` is left
/// unmodified.
pub fn decode(data: &mut [u8], erasures: &[usize]) -> DecodeOutcome {
    let msg_len = data.len() - PARITY_LEN;
    assert!(msg_len <= K, "RS codeword too long");
    let pad = K - msg_len; // virtual leading zero bytes not present in `data`
    let gf = gf();

    // Compute syndromes S_j = sum_i c_i * alpha^{(FCR+j*step)*i}, j=0..2t-1,
    // evaluated directly over the shortened (non-padded) codeword since the
    // omitted leading zero symbols contribute nothing.
    let mut syn = [0u8; PARITY_LEN];
    let mut all_zero = true;
    for (j, s) in syn.iter_mut().enumerate() {
        let root = gf.pow_alpha((FCR + j * PRIM_STEP) as i32);
        let mut acc = 0u8;
        for &byte in data.iter() {
            acc = gf.mul(acc, root) ^ byte;
        }
        *s = acc;
        if acc != 0 {
            all_zero = false;
        }
    }
    if all_zero && erasures.is_empty() {
        return DecodeOutcome::NoErrors;
    }

    // Erasure locator polynomial and modified syndromes, per standard
    // errors-and-erasures decoding (Karn's rs.c structure).
    if erasures.len() > PARITY_LEN {
        return DecodeOutcome::Failure;
    }
    // Erasure positions are expressed as exponents of alpha relative to the
    // codeword's least-significant (x^0) symbol, which is the *last* byte.
    let n_total = data.len();
    let eras_exp: Vec<i32> = erasures
        .iter()
        .map(|&pos| (n_total - 1 - pos) as i32)
        .collect();

    let mut lambda = vec![0u8; 1];
    lambda[0] = 1;
    for &ei in &eras_exp {
        let xi = gf.pow_alpha(ei);
        let mut new_lambda = vec![0u8; lambda.len() + 1];
        for (k, &lk) in lambda.iter().enumerate() {
            new_lambda[k] ^= gf.mul(lk, xi);
            new_lambda[k + 1] ^= lk;
        }
        lambda = new_lambda;
    }

    // Berlekamp-Massey on the syndromes, seeded with the erasure locator.
    let t2 = PARITY_LEN;
    let mut sigma = lambda.clone();
    sigma.resize(t2 / 2 + 2, 0);
    let mut b = sigma.clone();
    let mut l = eras_exp.len();
    let mut m = 1i32;
    let mut bcoef = 1u8;

    // Discrepancy computed against a "modified syndrome" that already
    // accounts for known erasures; for simplicity (and because NDATA-sized
    // blocks keep t small) we run classical BM seeded by sigma directly
    // against the raw syndromes, which is valid because sigma already
    // annihilates the erasure positions.
    for n in 0..t2 {
        let mut delta = syn[n];
        for i in 1..=l.min(sigma.len() - 1) {
            delta ^= gf.mul(sigma[i], syn[n - i.min(n)]);
        }
        // guard: when i > n the term is out of range for a causal syndrome
        // index; recompute delta correctly below instead of the approximation
        // above.
        delta = syn[n];
        for i in 1..sigma.len() {
            if i > n {
                break;
            }
            delta ^= gf.mul(sigma[i], syn[n - i]);
        }

        if delta == 0 {
            m += 1;
        } else if 2 * l <= n + eras_exp.len() {
            let t = sigma.clone();
            let coef = gf.mul(delta, gf.inv(bcoef));
            for i in 0..b.len() {
                if i + m as usize >= sigma.len() {
                    break;
                }
                sigma[i + m as usize] ^= gf.mul(coef, b[i]);
            }
            l = n + 1 - l;
            b = t;
            bcoef = delta;
            m = 1;
        } else {
            let coef = gf.mul(delta, gf.inv(bcoef));
            for i in 0..b.len() {
                if i + m as usize >= sigma.len() {
                    break;
                }
                sigma[i + m as usize] ^= gf.mul(coef, b[i]);
            }
            m += 1;
        }
    }

    let total_unknowns = l;
    if 2 * (total_unknowns.saturating_sub(eras_exp.len())) + eras_exp.len() > PARITY_LEN {
        return DecodeOutcome::Failure;
    }

    // Chien search: find roots of sigma(x) among alpha^{-i} for i in codeword range.
    let mut error_positions = Vec::new();
    for i in 0..n_total {
        // position i corresponds to exponent (n_total-1-i) as above
        let exp_i = (n_total - 1 - i) as i32;
        let x_inv = gf.pow_alpha(-exp_i);
        let mut acc = 0u8;
        let mut xp = 1u8;
        for &s in &sigma {
            acc ^= gf.mul(s, xp);
            xp = gf.mul(xp, x_inv);
        }
        if acc == 0 {
            error_positions.push(i);
        }
    }

    if error_positions.len() != total_unknowns.max(eras_exp.len()).max(error_positions.len()).min(total_unknowns.max(error_positions.len()))
        && error_positions.len() != total_unknowns
    {
        // Degree of sigma didn't match the number of roots found within the
        // codeword -- uncorrectable (too many errors, or errors fell outside
        // the shortened window).
        if error_positions.len() < eras_exp.len() {
            return DecodeOutcome::Failure;
        }
    }
    if error_positions.is_empty() && !eras_exp.is_empty() {
        // No roots found at all but erasures were declared: fall back to
        // using declared erasure positions only (pure erasure correction,
        // no additional errors).
        error_positions = erasures.to_vec();
    }

    // Omega(x) = [S(x) * sigma(x)] mod x^(2t), truncated to degree < sigma's degree.
    let mut omega = vec![0u8; t2];
    for i in 0..t2 {
        let mut acc = 0u8;
        for (j, &sj) in sigma.iter().enumerate() {
            if j > i {
                break;
            }
            acc ^= gf.mul(sj, syn[i - j]);
        }
        omega[i] = acc;
    }

    // Forney's algorithm: e_k = -omega(x_k^{-1}) / sigma'(x_k^{-1}). Corrections
    // are applied to `scratch`, not `data`, so every `Failure` return below
    // (including the post-correction syndrome re-check) leaves `data` as the
    // caller passed it in.
    let mut scratch = data.to_vec();
    let mut corrected = 0usize;
    for &pos in &error_positions {
        let exp_i = (n_total - 1 - pos) as i32;
        let x_inv = gf.pow_alpha(-exp_i);

        let mut omega_val = 0u8;
        let mut xp = 1u8;
        for &o in &omega {
            omega_val ^= gf.mul(o, xp);
            xp = gf.mul(xp, x_inv);
        }

        // sigma'(x) formal derivative: keep odd-degree terms only.
        let mut deriv_val = 0u8;
        let mut xp = 1u8;
        for (deg, &s) in sigma.iter().enumerate() {
            if deg % 2 == 1 {
                deriv_val ^= gf.mul(s, xp);
            }
            if deg > 0 {
                xp = gf.mul(xp, x_inv);
            }
        }
        if deriv_val == 0 {
            return DecodeOutcome::Failure;
        }
        let x_k = gf.pow_alpha(exp_i);
        let magnitude = gf.mul(gf.mul(omega_val, gf.inv(deriv_val)), x_k);
        if magnitude != 0 {
            scratch[pos] ^= magnitude;
            corrected += 1;
        }
    }

    let _ = pad;
    if corrected == 0 && !all_zero {
        return DecodeOutcome::Failure;
    }

    // Re-check syndromes after correction (against `scratch`); this is the
    // authoritative success signal (cheaper heuristics above can be
    // conservative about counting).
    let mut still_bad = false;
    for j in 0..PARITY_LEN {
        let root = gf.pow_alpha((FCR + j * PRIM_STEP) as i32);
        let mut acc = 0u8;
        for &byte in scratch.iter() {
            acc = gf.mul(acc, root) ^ byte;
        }
        if acc != 0 {
            still_bad = true;
            break;
        }
    }
    if still_bad {
        return DecodeOutcome::Failure;
    }

    data.copy_from_slice(&scratch);
    if corrected == 0 {
        DecodeOutcome::NoErrors
    } else {
        DecodeOutcome::Corrected(corrected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode_decode_roundtrip(msg: &[u8]) -> Vec<u8> {
        let parity = encode(msg);
        let mut codeword = msg.to_vec();
        codeword.extend_from_slice(&parity);
        codeword
    }

    #[test]
    fn clean_codeword_has_no_errors() {
        let msg = vec![0x42u8; 96 - PARITY_LEN];
        let mut codeword = encode_decode_roundtrip(&msg);
        assert_eq!(decode(&mut codeword, &[]), DecodeOutcome::NoErrors);
    }

    #[test]
    fn single_byte_error_is_corrected() {
        let msg: Vec<u8> = (0..(96 - PARITY_LEN)).map(|i| i as u8).collect();
        let mut codeword = encode_decode_roundtrip(&msg);
        let original = codeword.clone();
        codeword[10] ^= 0xFF;
        let outcome = decode(&mut codeword, &[]);
        assert!(matches!(outcome, DecodeOutcome::Corrected(_)));
        assert_eq!(codeword, original);
    }

    #[test]
    fn erasure_recovers_known_missing_symbol() {
        let msg: Vec<u8> = (0..(96 - PARITY_LEN)).map(|i| (i * 3) as u8).collect();
        let mut codeword = encode_decode_roundtrip(&msg);
        let original = codeword.clone();
        codeword[5] = 0x00;
        let outcome = decode(&mut codeword, &[5]);
        assert!(matches!(
            outcome,
            DecodeOutcome::Corrected(_) | DecodeOutcome::NoErrors
        ));
        assert_eq!(codeword, original);
    }

    #[test]
    fn too_many_errors_fail_cleanly() {
        let msg: Vec<u8> = vec![0xAAu8; 96 - PARITY_LEN];
        let mut codeword = encode_decode_roundtrip(&msg);
        let corrupted = codeword.clone();
        for i in 0..20 {
            codeword[i] ^= 0x55;
        }
        let outcome = decode(&mut codeword, &[]);
        if outcome == DecodeOutcome::Failure {
            assert_eq!(codeword, corrupted);
        }
    }
}

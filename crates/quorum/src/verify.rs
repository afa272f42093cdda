/// Round-specific acceptance check for a candidate result.
///
/// A verifier is supplied with every mining round. It is applied to the
/// first harvested response to pick a winner and then, independently, to
/// every other response to count agreement.
///
/// Any `Fn(&R) -> bool` is a verifier:
///
/// ```
/// use quorum::Verify;
///
/// let ends_in_zero = |n: &u64| n % 10 == 0;
/// assert!(ends_in_zero.verify(&120));
/// assert!(!ends_in_zero.verify(&121));
/// ```
pub trait Verify<R: ?Sized> {
    fn verify(&self, candidate: &R) -> bool;
}

impl<R, F> Verify<R> for F
where
    R: ?Sized,
    F: Fn(&R) -> bool,
{
    fn verify(&self, candidate: &R) -> bool {
        self(candidate)
    }
}

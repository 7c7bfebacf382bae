/// Rounds a byte count up to the header alignment ([`WORD`](crate::WORD)),
/// or `None` if that would wrap.
///
/// Every payload size goes through this before it reaches the arena, so the
/// header that follows a payload always lands on an aligned address.
///
/// # Examples
///
/// ```rust
/// use minalloc::align::checked_align;
///
/// match minalloc::WORD {
///     8 => assert_eq!(checked_align(13), Some(16)), // 64 bit machine.
///     4 => assert_eq!(checked_align(11), Some(12)), // 32 bit machine.
///     _ => {},
/// };
/// assert_eq!(checked_align(usize::MAX), None);
/// ```
pub const fn checked_align(value: usize) -> Option<usize> {
  match value.checked_add(crate::WORD - 1) {
    Some(padded) => Some(padded & !(crate::WORD - 1)),
    None => None,
  }
}

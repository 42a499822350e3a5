//! Page-alignment math shared by decode and encode.
//!
//! Every region of the container, the header included, is followed by
//! zero padding up to the next multiple of the page size. The bitmask
//! form requires `page_size` to be a power of two, which the header
//! parser and serializer validate before any of this runs.

/// Number of padding bytes needed after `len` to reach the next
/// `page_size` boundary. Zero when `len` is already aligned.
pub fn pad_len(len: usize, page_size: usize) -> usize {
    (page_size - (len & (page_size - 1))) & (page_size - 1)
}

/// `len` rounded up to the next multiple of `page_size`.
pub fn round_up(len: usize, page_size: usize) -> usize {
    len + pad_len(len, page_size)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aligned_lengths_need_no_padding() {
        assert_eq!(pad_len(0, 2048), 0);
        assert_eq!(pad_len(2048, 2048), 0);
        assert_eq!(pad_len(4096, 2048), 0);
        assert_eq!(round_up(4096, 2048), 4096);
    }

    #[test]
    fn unaligned_lengths_round_to_next_page() {
        assert_eq!(round_up(1, 2048), 2048);
        assert_eq!(round_up(2049, 2048), 4096);
        assert_eq!(round_up(5000, 2048), 6144);
        assert_eq!(round_up(3000, 2048), 4096);
        assert_eq!(pad_len(5000, 2048), 1144);
        assert_eq!(pad_len(3000, 2048), 1096);
    }
}

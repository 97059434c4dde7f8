//! Argument block formatting
//!
//! The command line is split on whitespace and laid out at the top of the
//! new user stack as:
//!
//! ```text
//! base + 0   argc            u64
//! base + 8   argv            u64, address of the pointer array
//! base + 16  argv[0..argc]   u64 each, then a zero terminator
//! ...        strings         NUL-terminated, packed
//! ```
//!
//! All pointers are user virtual addresses, so the block is only valid at
//! the base address it was formatted for.

use kernel_api::FormatError;

const WORD: usize = 8;

/// Size in bytes and argument count of the block for `command_line`
pub fn argument_block_size(command_line: &str) -> Result<(usize, usize), FormatError> {
    if command_line.contains('\0') {
        return Err(FormatError::InvalidCommandLine);
    }
    let argc = command_line.split_whitespace().count();
    let strings: usize = command_line
        .split_whitespace()
        .map(|arg| arg.len() + 1)
        .sum();
    Ok((2 * WORD + (argc + 1) * WORD + strings, argc))
}

/// Formats the argument block for `command_line` to live at `base`
pub fn format_argument_block(command_line: &str, base: u64) -> Result<Vec<u8>, FormatError> {
    let (size, argc) = argument_block_size(command_line)?;
    let argv = base + 2 * WORD as u64;
    let mut string_addr = argv + ((argc + 1) * WORD) as u64;

    let mut block = Vec::with_capacity(size);
    block.extend_from_slice(&(argc as u64).to_le_bytes());
    block.extend_from_slice(&argv.to_le_bytes());

    let mut strings = Vec::new();
    for arg in command_line.split_whitespace() {
        block.extend_from_slice(&string_addr.to_le_bytes());
        strings.extend_from_slice(arg.as_bytes());
        strings.push(0);
        string_addr += arg.len() as u64 + 1;
    }
    block.extend_from_slice(&0u64.to_le_bytes());
    block.extend_from_slice(&strings);

    debug_assert_eq!(block.len(), size);
    Ok(block)
}

/// Decodes a block formatted for `base` back into its arguments
///
/// Returns `None` if the block is malformed.
pub fn parse_argument_block(block: &[u8], base: u64) -> Option<Vec<String>> {
    let word = |offset: usize| -> Option<u64> {
        let raw = block.get(offset..offset + WORD)?;
        let mut bytes = [0u8; WORD];
        bytes.copy_from_slice(raw);
        Some(u64::from_le_bytes(bytes))
    };

    let argc = word(0)? as usize;
    let argv = word(WORD)?.checked_sub(base)? as usize;
    if word(argv + argc * WORD)? != 0 {
        return None;
    }

    (0..argc)
        .map(|i| {
            let start = word(argv + i * WORD)?.checked_sub(base)? as usize;
            let len = block.get(start..)?.iter().position(|b| *b == 0)?;
            String::from_utf8(block[start..start + len].to_vec()).ok()
        })
        .collect()
}

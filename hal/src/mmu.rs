//! Address-space loading and privilege-transition stack

use core_types::AddressSpaceId;

/// MMU and task-state control
///
/// Loading an address space makes its user half the one the CPU translates
/// through. The stack top installed here is where the CPU switches to when
/// an interrupt or system call arrives from user mode.
pub trait MmuHal {
    /// Makes `space`, rooted at the page-table frame `root`, the current
    /// user address space
    fn load_address_space(&self, space: AddressSpaceId, root: usize);

    /// Installs the kernel stack pointer used on entry from user mode
    fn set_kernel_stack_top(&self, address: usize);
}

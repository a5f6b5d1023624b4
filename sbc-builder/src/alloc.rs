//! Monotonic SPIR-V result-id allocation. Id `0` is reserved/invalid
//! per the SPIR-V spec, so the first allocated id is `1`.
#[derive(Default)]
pub struct IdAllocator {
    next: u32,
}
impl IdAllocator {
    pub fn new() -> Self {
        IdAllocator { next: 1 }
    }

    pub fn alloc(&mut self) -> u32 {
        let id = self.next;
        self.next += 1;
        id
    }

    /// The module's id bound: the smallest id that was never allocated.
    pub fn bound(&self) -> u32 {
        self.next
    }
}

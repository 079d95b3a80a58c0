/// Width, in bytes, of a serialized page identifier (spec §6.4). `NULL_PAGE_ID`
/// is the maximum value representable in the chosen width.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageIdWidth {
    One,
    Two,
    Four,
    Eight,
}

impl PageIdWidth {
    pub fn null_page_id(self) -> u64 {
        match self {
            PageIdWidth::One => u8::MAX as u64,
            PageIdWidth::Two => u16::MAX as u64,
            PageIdWidth::Four => u32::MAX as u64,
            PageIdWidth::Eight => u64::MAX,
        }
    }

    pub fn byte_len(self) -> usize {
        match self {
            PageIdWidth::One => 1,
            PageIdWidth::Two => 2,
            PageIdWidth::Four => 4,
            PageIdWidth::Eight => 8,
        }
    }
}

/// Store-wide knobs. One `StoreConfig` is shared (by reference) across every
/// walker call in this crate; none of it is global mutable state (design
/// note in spec §9) — every operation is handed the pieces it needs
/// explicitly.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub page_size: usize,
    pub page_id_width: PageIdWidth,
    /// Entries per radix page-table page (spec §4.8.1).
    pub fan_out: u64,
    /// Sizes the locked-pages stack (spec §4.2).
    pub max_tree_height: usize,
}

impl StoreConfig {
    pub fn builder() -> StoreConfigBuilder {
        StoreConfigBuilder::default()
    }

    pub fn null_page_id(&self) -> u64 {
        self.page_id_width.null_page_id()
    }
}

pub struct StoreConfigBuilder {
    page_size: usize,
    page_id_width: PageIdWidth,
    fan_out: u64,
    max_tree_height: usize,
}

impl Default for StoreConfigBuilder {
    fn default() -> Self {
        Self {
            page_size: 4096,
            page_id_width: PageIdWidth::Eight,
            fan_out: 64,
            max_tree_height: 16,
        }
    }
}

impl StoreConfigBuilder {
    pub fn page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    pub fn page_id_width(mut self, width: PageIdWidth) -> Self {
        self.page_id_width = width;
        self
    }

    pub fn fan_out(mut self, fan_out: u64) -> Self {
        self.fan_out = fan_out;
        self
    }

    pub fn max_tree_height(mut self, max_tree_height: usize) -> Self {
        self.max_tree_height = max_tree_height;
        self
    }

    pub fn build(self) -> StoreConfig {
        StoreConfig {
            page_size: self.page_size,
            page_id_width: self.page_id_width,
            fan_out: self.fan_out,
            max_tree_height: self.max_tree_height,
        }
    }
}

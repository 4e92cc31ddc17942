//! Memory and I/O bus interface.

/// Memory and I/O bus interface.
///
/// A CPU performs exactly one bus access per cycle through this trait.
/// The implementor decodes the address and routes it to RAM, ROM or a
/// chip register. Reads may have side effects (acknowledging interrupts,
/// clearing latches), so debuggers use a separate side-effect-free peek.
pub trait Bus {
    /// Read a byte from the given address.
    fn read(&mut self, address: u16) -> u8;

    /// Write a byte to the given address.
    fn write(&mut self, address: u16, value: u8);
}

/// Flat 64 KB RAM with no I/O, for CPU tests.
pub struct SimpleBus {
    ram: Box<[u8; 0x10000]>,
    /// Every access in order: `(address, value, is_write)`.
    log: Vec<(u16, u8, bool)>,
    logging: bool,
}

impl SimpleBus {
    #[must_use]
    pub fn new() -> Self {
        Self {
            ram: Box::new([0; 0x10000]),
            log: Vec::new(),
            logging: false,
        }
    }

    /// Copy `data` into RAM starting at `address` (wrapping at $FFFF).
    pub fn load(&mut self, address: u16, data: &[u8]) {
        let mut addr = address;
        for &byte in data {
            self.ram[addr as usize] = byte;
            addr = addr.wrapping_add(1);
        }
    }

    /// Read without recording an access.
    #[must_use]
    pub fn peek(&self, address: u16) -> u8 {
        self.ram[address as usize]
    }

    /// Start recording bus accesses, discarding anything recorded before.
    pub fn start_logging(&mut self) {
        self.log.clear();
        self.logging = true;
    }

    /// Accesses recorded since [`start_logging`](Self::start_logging).
    #[must_use]
    pub fn access_log(&self) -> &[(u16, u8, bool)] {
        &self.log
    }
}

impl Default for SimpleBus {
    fn default() -> Self {
        Self::new()
    }
}

impl Bus for SimpleBus {
    fn read(&mut self, address: u16) -> u8 {
        let value = self.ram[address as usize];
        if self.logging {
            self.log.push((address, value, false));
        }
        value
    }

    fn write(&mut self, address: u16, value: u8) {
        self.ram[address as usize] = value;
        if self.logging {
            self.log.push((address, value, true));
        }
    }
}

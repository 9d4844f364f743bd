use std::fmt;

use self::{
    frame::{CallStub, CALL_LOCAL_ARGS, CALL_STACK_ARGS},
    image::Image,
    memory::Memory,
};
use super::heap::Heap;
use crate::iff::quetzal::{ifhd::IFhd, mall::MAll, stks::Stks, umem::UMem, Quetzal};
use crate::{error::*, fatal_error, recoverable_error};

pub mod frame;
pub mod header;
pub mod image;
pub mod memory;

/// Machine state: the image, the stack, the heap, and the registers that
/// describe the active frame.
///
/// The stack holds interleaved call frames and call stubs.  `fp` points at
/// the active frame; `frame_len` and `locals_pos` mirror the two words at
/// the frame start.
pub struct State {
    image: Image,
    stack: Memory,
    heap: Heap,
    pc: usize,
    sp: usize,
    fp: usize,
    frame_len: usize,
    locals_pos: usize,
    stringtbl: usize,
    protect: Option<(usize, usize)>,
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "State: pc ${:06x}, sp {:#x}, fp {:#x}, memory {:#x}",
            self.pc,
            self.sp,
            self.fp,
            self.image.end_mem()
        )
    }
}

impl State {
    pub fn new(image: Image, max_heap: usize) -> Result<State, RuntimeError> {
        let stack_size = image.stack_size() * 4;
        if stack_size == 0 {
            return recoverable_error!(ErrorCode::InvalidImage, "Image declares no stack");
        }
        let stringtbl = image.decoding_table();
        Ok(State {
            image,
            stack: Memory::new(vec![0; stack_size], stack_size),
            heap: Heap::new(max_heap),
            pc: 0,
            sp: 0,
            fp: 0,
            frame_len: 0,
            locals_pos: 0,
            stringtbl,
            protect: None,
        })
    }

    pub fn image(&self) -> &Image {
        &self.image
    }

    pub fn image_mut(&mut self) -> &mut Image {
        &mut self.image
    }

    pub fn heap(&self) -> &Heap {
        &self.heap
    }

    // Registers
    pub fn pc(&self) -> usize {
        self.pc
    }

    pub fn set_pc(&mut self, pc: usize) {
        self.pc = pc;
    }

    pub fn sp(&self) -> usize {
        self.sp
    }

    pub fn set_sp(&mut self, sp: usize) {
        self.sp = sp;
    }

    pub fn fp(&self) -> usize {
        self.fp
    }

    pub fn set_fp(&mut self, fp: usize) {
        self.fp = fp;
    }

    pub fn frame_len(&self) -> usize {
        self.frame_len
    }

    pub fn locals_pos(&self) -> usize {
        self.locals_pos
    }

    pub fn stringtbl(&self) -> usize {
        self.stringtbl
    }

    pub fn set_stringtbl(&mut self, address: usize) {
        self.stringtbl = address;
    }

    pub fn protect(&self) -> Option<(usize, usize)> {
        self.protect
    }

    pub fn set_protect(&mut self, range: Option<(usize, usize)>) {
        self.protect = range;
    }

    // Main memory
    pub fn read_byte(&self, address: usize) -> Result<u8, RuntimeError> {
        self.image.read_byte(address)
    }

    pub fn read_short(&self, address: usize) -> Result<u16, RuntimeError> {
        self.image.read_short(address)
    }

    pub fn read_word(&self, address: usize) -> Result<u32, RuntimeError> {
        self.image.read_word(address)
    }

    pub fn write_byte(&mut self, address: usize, value: u8) -> Result<(), RuntimeError> {
        self.image.write_byte(address, value)
    }

    pub fn write_short(&mut self, address: usize, value: u16) -> Result<(), RuntimeError> {
        self.image.write_short(address, value)
    }

    pub fn write_word(&mut self, address: usize, value: u32) -> Result<(), RuntimeError> {
        self.image.write_word(address, value)
    }

    // Stack
    pub fn push(&mut self, value: u32) -> Result<(), RuntimeError> {
        if self.sp + 4 > self.stack.size() {
            return fatal_error!(
                ErrorCode::StackOverflow,
                "Stack overflow pushing at {:#x} (stack is {:#x} bytes)",
                self.sp,
                self.stack.size()
            );
        }
        self.stack.write_word(self.sp, value)?;
        self.sp += 4;
        Ok(())
    }

    pub fn pop(&mut self) -> Result<u32, RuntimeError> {
        if self.sp < self.fp + self.frame_len + 4 {
            return fatal_error!(
                ErrorCode::StackUnderflow,
                "Popped below the current frame (sp {:#x}, frame ends {:#x})",
                self.sp,
                self.fp + self.frame_len
            );
        }
        self.sp -= 4;
        self.stack.read_word(self.sp)
    }

    /// Values on the stack above the current frame
    pub fn value_count(&self) -> usize {
        (self.sp - (self.fp + self.frame_len)) / 4
    }

    /// Read the value `index` places down from the stack top
    pub fn peek(&self, index: usize) -> Result<u32, RuntimeError> {
        if index >= self.value_count() {
            return fatal_error!(
                ErrorCode::StackUnderflow,
                "Peek at {} but only {} values above the frame",
                index,
                self.value_count()
            );
        }
        self.stack.read_word(self.sp - 4 * (index + 1))
    }

    pub(crate) fn stack_word(&self, offset: usize) -> Result<u32, RuntimeError> {
        self.stack.read_word(offset)
    }

    pub(crate) fn set_stack_word(&mut self, offset: usize, value: u32) -> Result<(), RuntimeError> {
        self.stack.write_word(offset, value)
    }

    // Call stubs
    pub fn push_stub(&mut self, dest_type: u32, dest_addr: u32) -> Result<(), RuntimeError> {
        debug!(target: "app::stack", "Push stub: dest {:#x}/{:#x}, pc ${:06x}, fp {:#x}", dest_type, dest_addr, self.pc, self.fp);
        self.push(dest_type)?;
        self.push(dest_addr)?;
        self.push(self.pc as u32)?;
        self.push(self.fp as u32)
    }

    pub fn pop_stub(&mut self) -> Result<CallStub, RuntimeError> {
        if self.sp < 16 {
            return fatal_error!(
                ErrorCode::StackUnderflow,
                "Popped a call stub from an empty stack (sp {:#x})",
                self.sp
            );
        }
        let dest_type = self.stack.read_word(self.sp - 16)?;
        let dest_addr = self.stack.read_word(self.sp - 12)?;
        let pc = self.stack.read_word(self.sp - 8)?;
        let frame_ptr = self.stack.read_word(self.sp - 4)?;
        self.sp -= 16;
        let stub = CallStub::new(dest_type, dest_addr, pc, frame_ptr);
        debug!(target: "app::stack", "Pop {}", stub);
        Ok(stub)
    }

    /// Reload `frame_len` and `locals_pos` from the frame at `fp`
    pub fn read_frame(&mut self) -> Result<(), RuntimeError> {
        self.frame_len = self.stack.read_word(self.fp)? as usize;
        self.locals_pos = self.stack.read_word(self.fp + 4)? as usize;
        Ok(())
    }

    /// Lay out a new frame for the function at `address` and transfer
    /// control to its body.
    ///
    /// The caller is responsible for pushing a call stub first (a tail call
    /// deliberately does not).
    pub fn enter_function(&mut self, address: usize, arguments: &[u32]) -> Result<(), RuntimeError> {
        let call_type = self.image.read_byte(address)?;
        if call_type != CALL_STACK_ARGS && call_type != CALL_LOCAL_ARGS {
            return fatal_error!(
                ErrorCode::InvalidRoutine,
                "Call target {:#x} is not a function (type {:#02x})",
                address,
                call_type
            );
        }

        let format = frame::locals_format(&self.image, address)?;
        let fp = self.sp;
        if fp + format.frame_len() > self.stack.size() {
            return fatal_error!(
                ErrorCode::StackOverflow,
                "Stack overflow entering function {:#x}",
                address
            );
        }

        self.stack.write_word(fp, format.frame_len() as u32)?;
        self.stack.write_word(fp + 4, format.locals_pos() as u32)?;
        let mut table = Vec::new();
        for (width, count) in format.pairs() {
            table.push(*width);
            table.push(*count);
        }
        table.resize(format.locals_pos() - 8, 0);
        self.stack.write_bytes(fp + 8, &table)?;
        for a in fp + format.locals_pos()..fp + format.frame_len() {
            self.stack.write_byte(a, 0)?;
        }

        self.fp = fp;
        self.frame_len = format.frame_len();
        self.locals_pos = format.locals_pos();
        self.sp = fp + format.frame_len();

        if call_type == CALL_LOCAL_ARGS {
            // Arguments land in the locals, each truncated to its width
            let mut cursor: usize = 0;
            let mut arg = 0;
            for (width, count) in format.pairs() {
                let w = *width as usize;
                for _ in 0..*count {
                    cursor = cursor.div_ceil(w) * w;
                    if arg < arguments.len() {
                        self.local_write(cursor, w, arguments[arg])?;
                        arg += 1;
                    }
                    cursor += w;
                }
            }
        } else {
            // Arguments are pushed in reverse, then the count
            for a in arguments.iter().rev() {
                self.push(*a)?;
            }
            self.push(arguments.len() as u32)?;
        }

        debug!(target: "app::frame", "Enter function {:#x} ({} args), fp {:#x}, frame {:#x}", address, arguments.len(), self.fp, self.frame_len);
        self.pc = format.body();
        Ok(())
    }

    fn check_local(&self, offset: usize, width: usize) -> Result<usize, RuntimeError> {
        if self.locals_pos + offset + width > self.frame_len {
            fatal_error!(
                ErrorCode::InvalidLocalVariable,
                "Local at offset {:#x} is outside the frame ({:#x} bytes of locals)",
                offset,
                self.frame_len - self.locals_pos
            )
        } else {
            Ok(self.fp + self.locals_pos + offset)
        }
    }

    pub fn local_read(&self, offset: usize, width: usize) -> Result<u32, RuntimeError> {
        let a = self.check_local(offset, width)?;
        match width {
            1 => Ok(self.stack.read_byte(a)? as u32),
            2 => Ok(self.stack.read_short(a)? as u32),
            _ => self.stack.read_word(a),
        }
    }

    pub fn local_write(&mut self, offset: usize, width: usize, value: u32) -> Result<(), RuntimeError> {
        let a = self.check_local(offset, width)?;
        match width {
            1 => self.stack.write_byte(a, value as u8),
            2 => self.stack.write_short(a, value as u16),
            _ => self.stack.write_word(a, value),
        }
    }

    pub fn local(&self, offset: usize) -> Result<u32, RuntimeError> {
        self.local_read(offset, 4)
    }

    pub fn set_local(&mut self, offset: usize, value: u32) -> Result<(), RuntimeError> {
        self.local_write(offset, 4, value)
    }

    // Heap
    pub fn malloc(&mut self, size: usize) -> Result<usize, RuntimeError> {
        self.heap.alloc(&mut self.image, size)
    }

    pub fn mfree(&mut self, address: usize) -> Result<(), RuntimeError> {
        self.heap.free(&mut self.image, address)
    }

    /// Reconstruct RAM and registers for a restart, preserving any
    /// protected range.  The caller re-enters the start function.
    pub fn revert(&mut self) -> Result<(), RuntimeError> {
        self.heap.clear();
        self.image.revert(self.protect)?;
        self.sp = 0;
        self.fp = 0;
        self.frame_len = 0;
        self.locals_pos = 0;
        Ok(())
    }

    /// Replace the machine state from a save record.
    ///
    /// Everything is validated before anything is replaced, so a failed
    /// restore leaves the prior state untouched.  The trailing call stub is
    /// left on the stack for the caller to pop and redeem.
    pub fn restore_quetzal(&mut self, quetzal: &Quetzal) -> Result<(), RuntimeError> {
        let ifhd = quetzal.ifhd()?;
        if ifhd.data() != self.image.identity() {
            error!(target: "app::quetzal", "Save file does not match this program");
            return recoverable_error!(
                ErrorCode::Restore,
                "Save file does not match this program"
            );
        }
        let umem = quetzal.umem()?;
        let stks = quetzal.stks()?;
        let mall = quetzal.mall()?;

        if stks.data().len() > self.stack.size() || stks.data().len() % 4 != 0 {
            return recoverable_error!(
                ErrorCode::Restore,
                "Saved stack is {} bytes (stack is {:#x})",
                stks.data().len(),
                self.stack.size()
            );
        }

        let mut heap = Heap::new(self.heap.max_size());
        if let Some(m) = &mall {
            let blocks: Vec<(usize, usize)> = m
                .blocks()
                .iter()
                .map(|(o, l)| (*o as usize, *l as usize))
                .collect();
            heap.restore(m.address() as usize, &blocks)?;
        }

        self.image.restore_from(umem.ram(), self.protect)?;
        self.stack.write_bytes(0, stks.data())?;
        self.sp = stks.data().len();
        self.heap = heap;
        debug!(target: "app::quetzal", "State restored: {}", self);
        Ok(())
    }
}

impl TryFrom<&State> for Quetzal {
    type Error = RuntimeError;

    /// Snapshot the machine state.  The caller must already have pushed the
    /// call stub describing where to resume.
    fn try_from(state: &State) -> Result<Self, Self::Error> {
        let ifhd = IFhd::new(&state.image.identity());
        let ram_start = state.image.ram_start();
        let umem = UMem::new(&state.image.copy(ram_start, state.image.end_mem() - ram_start));
        let stks = Stks::new(&state.stack.copy(0, state.sp));
        let mall = if state.heap.active() {
            let blocks: Vec<(u32, u32)> = state
                .heap
                .blocks()
                .iter()
                .map(|(o, l)| (*o as u32, *l as u32))
                .collect();
            Some(MAll::new(state.heap.address() as u32, &blocks))
        } else {
            None
        };
        debug!(target: "app::quetzal", "Snapshot: sp {:#x}, ram {:#x} bytes", state.sp, state.image.end_mem() - ram_start);
        Ok(Quetzal::new(ifhd, umem, mall, stks))
    }
}

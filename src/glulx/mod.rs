//! The Glulx machine: the instruction cycle, the call protocol, and the
//! suspend/resume boundary with the host.
//!
//! The host drives the engine through [`Glulx::execute`].  The engine runs
//! until the program halts (`Ok(None)`) or until it needs something only the
//! host can provide (`Ok(Some(request))`).  A suspended engine holds its
//! whole state in ordinary registers plus the remembered store destinations,
//! so the host may take arbitrarily long to answer.
use std::collections::VecDeque;
use std::fmt;

use self::{
    accel::Accel,
    io::{Io, Output, Window},
    rng::{chacha_rng::ChaChaRng, GlulxRng},
    state::{
        frame::{CallStub, DestType},
        image::Image,
        State,
    },
};
use crate::{
    config::Config,
    error::*,
    fatal_error,
    iff::quetzal::Quetzal,
    instruction::{decoder, processor, Instruction, InstructionResult, Operand, OperandMode, Suspension},
    recoverable_error,
};

pub mod accel;
pub mod heap;
pub mod io;
pub mod rng;
pub mod state;
pub mod text;

/// What the program counter currently points into
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExecMode {
    /// Executing instructions
    Code,
    /// Printing a C-string, one byte per step
    CString,
    /// Printing a compressed string, one node per step
    CompressedString,
    /// Printing a Unicode string, one word per step
    UnicodeString,
    /// Printing a decimal number, one digit per step
    Number,
    /// A string or number just ended; pop the pending stub and resume
    Return,
}

/// What the engine is blocked on
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RequestType {
    ReadLine,
    ReadKey,
    Save,
    Restore,
}

/// Request for the host to do something the engine cannot
#[derive(Debug)]
pub struct HostRequest {
    request_type: RequestType,
    /// Channel output accumulated since the last delivery
    output: Output,
    /// Save: the serialized save record
    save_data: Vec<u8>,
    /// ReadLine: the longest input the program will accept
    max_len: usize,
}

impl HostRequest {
    fn read_line(max_len: usize, output: Output) -> HostRequest {
        HostRequest {
            request_type: RequestType::ReadLine,
            output,
            save_data: Vec::new(),
            max_len,
        }
    }

    fn read_key(output: Output) -> HostRequest {
        HostRequest {
            request_type: RequestType::ReadKey,
            output,
            save_data: Vec::new(),
            max_len: 0,
        }
    }

    fn save(save_data: Vec<u8>, output: Output) -> HostRequest {
        HostRequest {
            request_type: RequestType::Save,
            output,
            save_data,
            max_len: 0,
        }
    }

    fn restore(output: Output) -> HostRequest {
        HostRequest {
            request_type: RequestType::Restore,
            output,
            save_data: Vec::new(),
            max_len: 0,
        }
    }

    pub fn request_type(&self) -> RequestType {
        self.request_type
    }

    pub fn output(&self) -> &Output {
        &self.output
    }

    pub fn save_data(&self) -> &[u8] {
        &self.save_data
    }

    pub fn max_len(&self) -> usize {
        self.max_len
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResponseType {
    ReadLineComplete,
    ReadKeyComplete,
    SaveComplete,
    RestoreComplete,
}

/// Answer from the host to a [HostRequest]
#[derive(Debug)]
pub struct HostResponse {
    response_type: ResponseType,
    input: String,
    key: u32,
    success: bool,
    save_data: Vec<u8>,
}

impl HostResponse {
    pub fn line(input: &str) -> HostResponse {
        HostResponse {
            response_type: ResponseType::ReadLineComplete,
            input: input.to_string(),
            key: 0,
            success: true,
            save_data: Vec::new(),
        }
    }

    pub fn key(key: u32) -> HostResponse {
        HostResponse {
            response_type: ResponseType::ReadKeyComplete,
            input: String::new(),
            key,
            success: true,
            save_data: Vec::new(),
        }
    }

    pub fn save(success: bool) -> HostResponse {
        HostResponse {
            response_type: ResponseType::SaveComplete,
            input: String::new(),
            key: 0,
            success,
            save_data: Vec::new(),
        }
    }

    pub fn restore(save_data: &[u8]) -> HostResponse {
        HostResponse {
            response_type: ResponseType::RestoreComplete,
            input: String::new(),
            key: 0,
            success: true,
            save_data: save_data.to_vec(),
        }
    }

    pub fn restore_failed() -> HostResponse {
        HostResponse {
            response_type: ResponseType::RestoreComplete,
            input: String::new(),
            key: 0,
            success: false,
            save_data: Vec::new(),
        }
    }
}

/// Store destinations left pending while the host answers a request
enum Pending {
    Line {
        buffer: usize,
        max_len: usize,
        stores: Vec<Operand>,
    },
    Key {
        stores: Vec<Operand>,
    },
    Save {
        dest: (u32, u32),
    },
    Restore {
        dest: (u32, u32),
    },
}

/// The machine: image, stack, heap, output routing, and the registers that
/// drive the instruction cycle.
pub struct Glulx {
    state: State,
    io: Io,
    accel: Accel,
    rng: Box<dyn GlulxRng>,
    exec_mode: ExecMode,
    /// CompressedString only: bit position within the byte at `pc`
    bit_pos: usize,
    /// Number only: index of the next digit to print
    printing_digit: usize,
    undo: VecDeque<Quetzal>,
    undo_depth: usize,
    pending: Option<Pending>,
    running: bool,
    instruction_count: usize,
}

impl fmt::Display for Glulx {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "Glulx: {:?} {}, {} instructions",
            self.exec_mode, self.state, self.instruction_count
        )
    }
}

impl Glulx {
    pub fn new(data: Vec<u8>, config: &Config) -> Result<Glulx, RuntimeError> {
        let image = Image::new(data)?;
        let mut state = State::new(image, config.max_heap())?;
        let start = state.image().start_func();
        state.enter_function(start, &[])?;
        info!(target: "app::trace", "Machine starts at ${:06x}", state.pc());
        Ok(Glulx {
            state,
            io: Io::new(),
            accel: Accel::new(),
            rng: Box::new(ChaChaRng::new()),
            exec_mode: ExecMode::Code,
            bit_pos: 0,
            printing_digit: 0,
            undo: VecDeque::new(),
            undo_depth: config.undo_depth(),
            pending: None,
            running: true,
            instruction_count: 0,
        })
    }

    pub fn running(&self) -> bool {
        self.running
    }

    pub fn state(&self) -> &State {
        &self.state
    }

    pub(crate) fn state_mut(&mut self) -> &mut State {
        &mut self.state
    }

    pub fn io(&self) -> &Io {
        &self.io
    }

    pub(crate) fn io_mut(&mut self) -> &mut Io {
        &mut self.io
    }

    pub(crate) fn accel_mut(&mut self) -> &mut Accel {
        &mut self.accel
    }

    pub(crate) fn rng_mut(&mut self) -> &mut dyn GlulxRng {
        &mut *self.rng
    }

    pub(crate) fn exec_mode(&self) -> ExecMode {
        self.exec_mode
    }

    pub(crate) fn set_exec_mode(&mut self, mode: ExecMode) {
        self.exec_mode = mode;
    }

    pub(crate) fn bit_pos(&self) -> usize {
        self.bit_pos
    }

    pub(crate) fn set_bit_pos(&mut self, bit_pos: usize) {
        self.bit_pos = bit_pos;
    }

    pub(crate) fn printing_digit(&self) -> usize {
        self.printing_digit
    }

    pub(crate) fn set_printing_digit(&mut self, digit: usize) {
        self.printing_digit = digit;
    }

    /// Attach a single-window I/O layer for the window output target.
    pub fn attach_window(&mut self, window: Box<dyn Window>) {
        self.io.set_window(window);
    }

    /// Return and clear all accumulated channel output.
    pub fn flush_output(&mut self) -> Output {
        self.io.flush()
    }

    /// Run until the program halts or needs the host.
    ///
    /// `response` answers the request the engine last suspended on; pass
    /// `None` on the first call.  `Ok(None)` means the program is over.
    pub fn execute(
        &mut self,
        response: Option<HostResponse>,
    ) -> Result<Option<HostRequest>, RuntimeError> {
        match response {
            Some(response) => self.resume(response)?,
            None => {
                if self.pending.is_some() {
                    return recoverable_error!(
                        ErrorCode::Interpreter,
                        "Engine is suspended and needs a host response"
                    );
                }
            }
        }

        while self.running {
            self.instruction_count += 1;
            log_mdc::insert("instruction_count", format!("{:8x}", self.instruction_count));
            if let Some(request) = self.step()? {
                return Ok(Some(request));
            }
        }
        Ok(None)
    }

    fn step(&mut self) -> Result<Option<HostRequest>, RuntimeError> {
        match self.exec_mode {
            ExecMode::Code => self.step_code(),
            ExecMode::Return => {
                let stub = self.state.pop_stub()?;
                self.redeem_stub(stub, 0)?;
                Ok(None)
            }
            _ => {
                text::step(self)?;
                Ok(None)
            }
        }
    }

    fn step_code(&mut self) -> Result<Option<HostRequest>, RuntimeError> {
        let instruction = decoder::decode_instruction(&self.state, self.state.pc())?;
        debug!(target: "app::instruction", "{}", instruction);
        self.state.set_pc(instruction.next_address());
        match processor::dispatch(self, &instruction)? {
            InstructionResult::Continue(values) => {
                processor::store_values(self, instruction.stores(), &values)?;
                Ok(None)
            }
            InstructionResult::Quit => {
                debug!(target: "app::trace", "Program over after {} instructions", self.instruction_count);
                self.running = false;
                Ok(None)
            }
            InstructionResult::Suspend(suspension) => Ok(Some(self.suspend(&instruction, suspension)?)),
        }
    }

    /// Record the pending store destinations and build the host request,
    /// delivering any buffered output with it.
    fn suspend(
        &mut self,
        instruction: &Instruction,
        suspension: Suspension,
    ) -> Result<HostRequest, RuntimeError> {
        let output = self.io.flush();
        match suspension {
            Suspension::ReadLine { buffer, max_len } => {
                self.pending = Some(Pending::Line {
                    buffer,
                    max_len,
                    stores: instruction.stores().to_vec(),
                });
                Ok(HostRequest::read_line(max_len, output))
            }
            Suspension::ReadKey => {
                self.pending = Some(Pending::Key {
                    stores: instruction.stores().to_vec(),
                });
                Ok(HostRequest::read_key(output))
            }
            Suspension::Save { data } => {
                let dest = self.stub_dest(instruction.dest())?;
                self.pending = Some(Pending::Save { dest });
                Ok(HostRequest::save(data, output))
            }
            Suspension::Restore => {
                let dest = self.stub_dest(instruction.dest())?;
                self.pending = Some(Pending::Restore { dest });
                Ok(HostRequest::restore(output))
            }
        }
    }

    /// Perform the stores deferred at suspension, then fall back into the
    /// ordinary step loop.
    fn resume(&mut self, response: HostResponse) -> Result<(), RuntimeError> {
        let pending = match self.pending.take() {
            Some(p) => p,
            None => {
                return recoverable_error!(
                    ErrorCode::Interpreter,
                    "Host response but nothing is pending"
                )
            }
        };
        match (pending, response.response_type) {
            (
                Pending::Line {
                    buffer,
                    max_len,
                    stores,
                },
                ResponseType::ReadLineComplete,
            ) => {
                let bytes: Vec<u8> = response
                    .input
                    .chars()
                    .map(|c| if (c as u32) < 0x100 { c as u8 } else { b'?' })
                    .take(max_len)
                    .collect();
                for (i, b) in bytes.iter().enumerate() {
                    self.state.write_byte(buffer + i, *b)?;
                }
                debug!(target: "app::stream", "Read line: {} bytes", bytes.len());
                processor::store_values(self, &stores, &[bytes.len() as u32])
            }
            (Pending::Key { stores }, ResponseType::ReadKeyComplete) => {
                processor::store_values(self, &stores, &[response.key])
            }
            (Pending::Save { dest }, ResponseType::SaveComplete) => {
                self.store_dest(dest, if response.success { 0 } else { 1 })
            }
            (Pending::Restore { dest }, ResponseType::RestoreComplete) => {
                if response.success {
                    match self.do_restore(&response.save_data) {
                        Ok(()) => Ok(()),
                        Err(e) if e.is_recoverable() => {
                            warn!(target: "app::quetzal", "Restore failed: {}", e);
                            self.store_dest(dest, 1)
                        }
                        Err(e) => Err(e),
                    }
                } else {
                    self.store_dest(dest, 1)
                }
            }
            (pending, _) => {
                self.pending = Some(pending);
                recoverable_error!(
                    ErrorCode::Interpreter,
                    "Host response does not answer the pending request"
                )
            }
        }
    }

    /// Replace the whole machine state from a serialized save record and
    /// resume from its trailing call stub.
    fn do_restore(&mut self, data: &[u8]) -> Result<(), RuntimeError> {
        let quetzal = Quetzal::try_from(data)?;
        self.state.restore_quetzal(&quetzal)?;
        let stub = self.state.pop_stub()?;
        self.redeem_stub(stub, 0xFFFFFFFF)
    }

    /// Push a call stub for `dest` and transfer control to the function at
    /// `address`.
    pub(crate) fn perform_call(
        &mut self,
        address: usize,
        arguments: &[u32],
        dest: Option<&Operand>,
    ) -> Result<(), RuntimeError> {
        let (dest_type, dest_addr) = self.stub_dest(dest)?;
        self.state.push_stub(dest_type, dest_addr)?;
        self.state.enter_function(address, arguments)
    }

    /// Replace the current frame with the callee's, reusing the caller's
    /// call stub.
    pub(crate) fn tail_call(
        &mut self,
        address: usize,
        arguments: &[u32],
    ) -> Result<(), RuntimeError> {
        self.state.set_sp(self.state.fp());
        self.state.enter_function(address, arguments)
    }

    /// Take a branch.  Targets 0 and 1 return from the current function
    /// with that value; anything else is an offset from the end of the
    /// branch operand.
    pub(crate) fn branch(&mut self, target: u32) -> Result<(), RuntimeError> {
        match target {
            0 | 1 => self.do_return(target),
            _ => {
                let pc = (self.state.pc() as u32).wrapping_add(target).wrapping_sub(2);
                self.state.set_pc(pc as usize);
                Ok(())
            }
        }
    }

    /// Return from the current function.  Returning from the topmost frame
    /// ends the program.
    pub(crate) fn do_return(&mut self, value: u32) -> Result<(), RuntimeError> {
        self.state.set_sp(self.state.fp());
        if self.state.sp() == 0 {
            debug!(target: "app::frame", "Top-level return {:#x}, program over", value);
            self.running = false;
            return Ok(());
        }
        let stub = self.state.pop_stub()?;
        self.redeem_stub(stub, value)
    }

    /// Send `value` wherever a popped call stub says it should go, and pick
    /// execution back up where the stub recorded.
    pub(crate) fn redeem_stub(&mut self, stub: CallStub, value: u32) -> Result<(), RuntimeError> {
        self.state.set_fp(stub.frame_ptr() as usize);
        self.state.read_frame()?;
        self.state.set_pc(stub.pc() as usize);
        self.exec_mode = match DestType::from_word(stub.dest_type())? {
            DestType::ResumeCode => ExecMode::Code,
            DestType::ResumeCString => ExecMode::CString,
            DestType::ResumeUnicode => ExecMode::UnicodeString,
            DestType::ResumeCompressed => {
                self.bit_pos = stub.dest_addr() as usize;
                ExecMode::CompressedString
            }
            DestType::ResumeNumber => {
                self.printing_digit = stub.dest_addr() as usize;
                ExecMode::Number
            }
            _ => {
                self.store_dest((stub.dest_type(), stub.dest_addr()), value)?;
                ExecMode::Code
            }
        };
        Ok(())
    }

    /// Translate a decoded delayed-store operand into call stub form.
    pub(crate) fn stub_dest(&self, operand: Option<&Operand>) -> Result<(u32, u32), RuntimeError> {
        match operand {
            None => Ok((0, 0)),
            Some(o) => match o.mode() {
                OperandMode::Zero => Ok((0, 0)),
                OperandMode::MemByte | OperandMode::MemShort | OperandMode::MemWord => {
                    Ok((1, o.value()))
                }
                OperandMode::RamByte | OperandMode::RamShort | OperandMode::RamWord => {
                    Ok((1, self.state.image().ram_address(o.value()) as u32))
                }
                OperandMode::LocalByte | OperandMode::LocalShort | OperandMode::LocalWord => {
                    Ok((2, o.value()))
                }
                OperandMode::Stack => Ok((3, 0)),
                _ => fatal_error!(
                    ErrorCode::InvalidOperand,
                    "Delayed store through a literal operand"
                ),
            },
        }
    }

    /// Redeem a delayed-store destination immediately.
    pub(crate) fn store_dest(&mut self, dest: (u32, u32), value: u32) -> Result<(), RuntimeError> {
        match DestType::from_word(dest.0)? {
            DestType::None => Ok(()),
            DestType::Memory => self.state.write_word(dest.1 as usize, value),
            DestType::Local => self.state.local_write(dest.1 as usize, 4, value),
            DestType::Stack => self.state.push(value),
            _ => fatal_error!(
                ErrorCode::InvalidOperand,
                "Delayed store cannot use a resume destination"
            ),
        }
    }

    /// Turn one printed character into a call of the filter routine, with a
    /// stub recording where printing resumes afterward.
    pub(crate) fn call_filter(
        &mut self,
        c: u32,
        dest_type: DestType,
        dest_addr: u32,
    ) -> Result<(), RuntimeError> {
        let filter = self.io.filter() as usize;
        self.state.push_stub(dest_type.as_word(), dest_addr)?;
        self.state.enter_function(filter, &[c])?;
        self.exec_mode = ExecMode::Code;
        Ok(())
    }

    pub(crate) fn push_undo(&mut self, quetzal: Quetzal) {
        if self.undo_depth == 0 {
            return;
        }
        while self.undo.len() >= self.undo_depth {
            self.undo.pop_front();
        }
        self.undo.push_back(quetzal);
    }

    pub(crate) fn pop_undo(&mut self) -> Option<Quetzal> {
        self.undo.pop_back()
    }

    pub fn has_undo(&self) -> bool {
        !self.undo.is_empty()
    }

    /// Rebuild RAM from the original image and re-enter the start function.
    pub(crate) fn restart(&mut self) -> Result<(), RuntimeError> {
        info!(target: "app::trace", "Restart");
        self.state.revert()?;
        let stringtbl = self.state.image().decoding_table();
        self.state.set_stringtbl(stringtbl);
        self.exec_mode = ExecMode::Code;
        let start = self.state.image().start_func();
        self.state.enter_function(start, &[])
    }
}

//! Machine instance and executor.
//!
//! An [`Instance`] owns the shared register file, the six stacks and one
//! [`ThreadControl`] per thread, all behind a single mutex. Each executor
//! step takes the mutex, so instructions from different threads never
//! interleave mid-instruction; the `lock`/`unlock` instructions widen that
//! to an instance-wide critical section spanning several steps.
//!
//! Handlers return `Result<(), Fault>`. The first fault sets the halt flag,
//! which every thread observes before its next step.

pub(crate) mod ops;

use crate::types::wide::{U256, WideInt};
use crate::virtual_machine::config::MachineConfig;
use crate::virtual_machine::errors::Fault;
use crate::virtual_machine::isa::InstructionSet;
use crate::virtual_machine::program::{Instruction, Program};
use crate::virtual_machine::registers::{Bank, RegisterFile};
use crate::virtual_machine::stacks::StackSet;
use crate::virtual_machine::thread::{ThreadControl, ThreadStatus};
use crate::{debug, info, warn};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::thread;

/// State shared by all threads of an instance.
#[derive(Debug)]
pub struct MachineState {
    pub registers: RegisterFile,
    pub stacks: StackSet,
    pub threads: Vec<ThreadControl>,
    /// Thread inside the `lock`/`unlock` critical section.
    critical: Option<usize>,
    fault: Option<Fault>,
}

impl MachineState {
    /// Thread holding the critical section, if any.
    pub fn critical_owner(&self) -> Option<usize> {
        self.critical
    }
}

/// Execution context handed to instruction handlers.
pub struct Cpu<'a> {
    thread: usize,
    state: &'a mut MachineState,
}

impl<'a> Cpu<'a> {
    /// Index of the executing thread.
    pub fn thread(&self) -> usize {
        self.thread
    }

    pub fn registers(&self) -> &RegisterFile {
        &self.state.registers
    }

    pub fn registers_mut(&mut self) -> &mut RegisterFile {
        &mut self.state.registers
    }

    pub fn stacks_mut(&mut self) -> &mut StackSet {
        &mut self.state.stacks
    }

    /// Registers and stacks borrowed together.
    pub fn split(&mut self) -> (&mut RegisterFile, &mut StackSet) {
        (&mut self.state.registers, &mut self.state.stacks)
    }

    /// Control block of the executing thread.
    pub fn control(&mut self) -> &mut ThreadControl {
        &mut self.state.threads[self.thread]
    }

    /// Enters the critical section. Re-entering as the owner is a no-op.
    pub fn lock(&mut self) {
        debug_assert!(self.state.critical.is_none_or(|owner| owner == self.thread));
        self.state.critical = Some(self.thread);
    }

    /// Leaves the critical section.
    pub fn unlock(&mut self) -> Result<(), Fault> {
        if self.state.critical != Some(self.thread) {
            return Err(Fault::NotLockOwner {
                thread: self.thread,
            });
        }
        self.state.critical = None;
        Ok(())
    }
}

/// A configured machine: registers, stacks and thread control blocks.
#[derive(Debug)]
pub struct Instance {
    config: MachineConfig,
    state: Mutex<MachineState>,
    turn: Condvar,
    halt: AtomicBool,
}

impl Instance {
    /// Builds an instance, binding one socket per thread when the
    /// configuration enables networking.
    pub fn new(config: MachineConfig) -> Self {
        let threads = (0..config.threads)
            .map(|index| ThreadControl::open(index, config.network.as_ref()))
            .collect::<Vec<_>>();
        let locked = threads.iter().filter(|t| t.is_locked()).count();
        info!(
            "instance created: {} threads ({} locked), {}-byte stacks",
            threads.len(),
            locked,
            config.stack_size
        );

        Self {
            state: Mutex::new(MachineState {
                registers: RegisterFile::new(),
                stacks: StackSet::new(config.stack_size),
                threads,
                critical: None,
                fault: None,
            }),
            turn: Condvar::new(),
            halt: AtomicBool::new(false),
            config,
        }
    }

    pub fn config(&self) -> &MachineConfig {
        &self.config
    }

    /// True once any thread faulted.
    pub fn halted(&self) -> bool {
        self.halt.load(Ordering::Acquire)
    }

    /// First fault raised, if any.
    pub fn fault(&self) -> Option<Fault> {
        self.state().fault
    }

    pub fn thread_count(&self) -> usize {
        self.state().threads.len()
    }

    /// Reads register `index` as a value of width `B`.
    pub fn register<const B: usize>(&self, index: u8) -> Result<WideInt<B>, Fault> {
        self.state().registers.get(index)
    }

    /// Writes register `index`, which must be in the bank of width `B`.
    pub fn set_register<const B: usize>(&self, index: u8, value: WideInt<B>) -> Result<(), Fault> {
        self.state().registers.set(index, value)
    }

    /// Copy of the register file.
    pub fn registers(&self) -> RegisterFile {
        self.state().registers.clone()
    }

    /// Elements currently on the stack of `bank`.
    pub fn stack_depth(&self, bank: Bank) -> usize {
        self.state().stacks.get(bank).depth()
    }

    pub fn thread_pc(&self, thread: usize) -> Option<U256> {
        self.state().threads.get(thread).map(ThreadControl::pc)
    }

    pub fn thread_status(&self, thread: usize) -> Option<ThreadStatus> {
        self.state().threads.get(thread).map(ThreadControl::status)
    }

    /// True when `thread`'s socket setup failed. `None` for unknown threads.
    pub fn thread_locked(&self, thread: usize) -> Option<bool> {
        self.state().threads.get(thread).map(ThreadControl::is_locked)
    }

    /// Address `thread`'s socket is bound to.
    pub fn local_addr(&self, thread: usize) -> Option<SocketAddr> {
        self.state().threads.get(thread).and_then(ThreadControl::local_addr)
    }

    /// Thread holding the `lock` critical section.
    pub fn critical_owner(&self) -> Option<usize> {
        self.state().critical_owner()
    }

    /// Executes one instruction on behalf of `thread` without touching its
    /// program counter.
    ///
    /// Waits while another thread holds the critical section. Unknown
    /// opcodes do nothing; a faulting handler halts the instance.
    pub fn exec_instruction(&self, instr: &Instruction<'_>, thread: usize, set: &InstructionSet) {
        let mut state = self.wait_turn(thread);
        self.step(&mut state, instr, thread, set);
    }

    /// Locks the state, recovering it if another thread panicked while
    /// holding the mutex.
    fn state(&self) -> MutexGuard<'_, MachineState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Locks the state once no other thread holds the critical section or
    /// the instance has halted.
    fn wait_turn(&self, thread: usize) -> MutexGuard<'_, MachineState> {
        let mut state = self.state();
        while !self.halted() && state.critical.is_some_and(|owner| owner != thread) {
            state = self.turn.wait(state).unwrap_or_else(PoisonError::into_inner);
        }
        state
    }

    fn step(
        &self,
        state: &mut MachineState,
        instr: &Instruction<'_>,
        thread: usize,
        set: &InstructionSet,
    ) {
        if self.halted() {
            return;
        }
        let count = state.threads.len();
        if thread >= count {
            self.raise(state, Fault::ThreadOutOfRange { thread, count });
            return;
        }
        let Some(desc) = set.find(instr.opcode()) else {
            debug!(
                "thread {thread}: opcode {:#010x} not in instruction set",
                instr.opcode()
            );
            return;
        };

        let owner = state.critical;
        let result = desc.invoke(&mut Cpu { thread, state }, instr);
        if state.critical != owner {
            self.turn.notify_all();
        }
        if let Err(fault) = result {
            self.raise(state, fault);
        }
    }

    /// Halts the instance, keeping the first fault.
    fn raise(&self, state: &mut MachineState, fault: Fault) {
        if state.fault.is_none() {
            warn!("machine halted: {fault}");
            state.fault = Some(fault);
        }
        self.halt.store(true, Ordering::Release);
        self.turn.notify_all();
    }

    /// Gives up the critical section if `thread` holds it.
    fn leave(&self, thread: usize) {
        let mut state = self.state();
        if state.critical == Some(thread) {
            debug!("thread {thread} finished inside the critical section");
            state.critical = None;
            self.turn.notify_all();
        }
    }

    fn idle(&self) {
        thread::yield_now();
        if !self.config.poll_interval.is_zero() {
            thread::sleep(self.config.poll_interval);
        }
    }

    /// Runs `program` on `thread` from instruction 0.
    ///
    /// Stops after as many advancing steps as the program has instructions,
    /// when the program counter lands just past the last instruction, or as
    /// soon as the instance halts. Every step that does not leave the thread
    /// waiting advances the program counter by one, jumps included, so
    /// `go n` continues at `n + 1`. A counter past that end halts the
    /// instance. A step that leaves the thread waiting on the network does
    /// not count and does not move the program counter; with a wait limit
    /// configured, too many of them in a row halt the instance. A thread
    /// whose socket setup failed does not run at all.
    pub fn run_program(&self, program: &Program<'_>, thread: usize, set: &InstructionSet) {
        {
            let mut state = self.state();
            let count = state.threads.len();
            let Some(control) = state.threads.get_mut(thread) else {
                self.raise(&mut state, Fault::ThreadOutOfRange { thread, count });
                return;
            };
            if control.is_locked() {
                debug!("thread {thread} is locked, skipping program");
                return;
            }
            control.rewind();
        }

        let len = program.len();
        let mut advanced = 0;
        let mut polls = 0;
        while advanced < len && !self.halted() {
            let mut state = self.wait_turn(thread);
            if self.halted() {
                break;
            }

            let pc = state.threads[thread].pc();
            let Some(index) = pc.try_to_index().filter(|&index| index <= len) else {
                self.raise(&mut state, Fault::PcOutOfRange { pc, len });
                break;
            };
            let Some(instr) = program.get(index) else {
                break;
            };
            self.step(&mut state, instr, thread, set);

            let control = &mut state.threads[thread];
            if control.is_waiting() {
                polls += 1;
                if self.config.wait_limit.is_some_and(|limit| polls >= limit) {
                    self.raise(&mut state, Fault::WaitTimeout { thread, polls });
                    break;
                }
                drop(state);
                self.idle();
                continue;
            }
            polls = 0;
            control.advance();
            advanced += 1;

            let pc = control.pc();
            if pc.try_to_index().is_none_or(|index| index > len) {
                self.raise(&mut state, Fault::PcOutOfRange { pc, len });
            }
        }

        self.leave(thread);
    }

    /// Runs each `(thread, program)` pair on its own OS thread and returns
    /// once all of them finish.
    ///
    /// A thread index listed twice halts the instance before anything runs.
    pub fn run_concurrently(&self, entries: &[(usize, &Program<'_>)], set: &InstructionSet) {
        for (position, &(thread, _)) in entries.iter().enumerate() {
            if entries[..position].iter().any(|&(seen, _)| seen == thread) {
                self.raise(&mut self.state(), Fault::DuplicateThread { thread });
                return;
            }
        }

        thread::scope(|scope| {
            for &(thread, program) in entries {
                scope.spawn(move || self.run_program(program, thread, set));
            }
        });
    }

    /// Closes every socket and drops the instance.
    pub fn release(self) {
        let mut state = self.state.into_inner().unwrap_or_else(PoisonError::into_inner);
        for control in &mut state.threads {
            control.close();
        }
        info!("instance released");
    }
}

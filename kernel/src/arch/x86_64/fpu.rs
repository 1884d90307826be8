//! FXSAVE area handling and the boot-time reset template
//!
//! Every thread owns one 512-byte legacy FXSAVE image. The image is kept as
//! raw bytes in exactly the layout `fxsave`/`fxrstor` use so it can be
//! handed to the hardware and to user space without conversion; typed
//! accessors cover the fields the kernel inspects.
//!
//! Bytes 464..512 are ignored by the processor ("available for software").
//! Signal delivery stores the trap's fault metadata there, see
//! [`FaultMetadata`].

use core::{fmt, ops::Range};

use spin::Once;

use super::{
    cpu::CpuOps,
    diag::{fatal, FatalError},
    validate::{validate_fpu_state, FpuFault},
};

/// Size of the legacy FXSAVE image.
pub const FXSAVE_AREA_SIZE: usize = 512;

/// x87 control word after `fninit`: all exceptions masked, 64-bit
/// precision, round to nearest.
pub const FCW_DEFAULT: u16 = 0x037F;

/// MXCSR after reset: all SIMD exceptions masked, no flags pending.
pub const MXCSR_DEFAULT: u32 = 0x1F80;

/// MXCSR feature mask assumed when the image reports zero.
pub const MXCSR_MASK_DEFAULT: u32 = 0xFFBF;

const FCW: usize = 0;
const FSW: usize = 2;
const MXCSR: usize = 24;
const MXCSR_MASK: usize = 28;
const ST_SPACE: Range<usize> = 32..160;
const XMM_SPACE: Range<usize> = 160..416;

// Fault metadata in the software-available tail.
const META_FAULT_ADDRESS: usize = 464;
const META_ERROR_CODE: usize = 472;
const META_CS: usize = 480;
const META_SS: usize = 482;
const META_DS: usize = 484;
const META_ES: usize = 486;
const META_FS: usize = 488;
const META_GS: usize = 490;
const META_VECTOR: usize = 492;
const META_END: usize = 496;

/// x86_64 FPU/SSE state in FXSAVE layout
#[repr(C, align(64))]
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct FpuState {
    fxsave: [u8; FXSAVE_AREA_SIZE],
}

/// Trap-time metadata carried in the FXSAVE software area of a signal
/// context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FaultMetadata {
    /// CR2 at the time of the trap
    pub fault_address: u64,
    /// Hardware error code pushed by the CPU (0 when none)
    pub error_code: u64,
    pub cs: u16,
    pub ss: u16,
    pub ds: u16,
    pub es: u16,
    pub fs: u16,
    pub gs: u16,
    /// Interrupt / exception vector
    pub trap_vector: u32,
}

impl FpuState {
    /// All-zero image. Not loadable as-is (the control word is invalid).
    pub const fn zeroed() -> Self {
        Self {
            fxsave: [0; FXSAVE_AREA_SIZE],
        }
    }

    pub fn as_bytes(&self) -> &[u8; FXSAVE_AREA_SIZE] {
        &self.fxsave
    }

    pub fn as_bytes_mut(&mut self) -> &mut [u8; FXSAVE_AREA_SIZE] {
        &mut self.fxsave
    }

    fn read_u16(&self, offset: usize) -> u16 {
        u16::from_le_bytes([self.fxsave[offset], self.fxsave[offset + 1]])
    }

    fn write_u16(&mut self, offset: usize, value: u16) {
        self.fxsave[offset..offset + 2].copy_from_slice(&value.to_le_bytes());
    }

    fn read_u32(&self, offset: usize) -> u32 {
        let mut raw = [0u8; 4];
        raw.copy_from_slice(&self.fxsave[offset..offset + 4]);
        u32::from_le_bytes(raw)
    }

    fn write_u32(&mut self, offset: usize, value: u32) {
        self.fxsave[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
    }

    fn read_u64(&self, offset: usize) -> u64 {
        let mut raw = [0u8; 8];
        raw.copy_from_slice(&self.fxsave[offset..offset + 8]);
        u64::from_le_bytes(raw)
    }

    fn write_u64(&mut self, offset: usize, value: u64) {
        self.fxsave[offset..offset + 8].copy_from_slice(&value.to_le_bytes());
    }

    /// x87 control word (FCW)
    pub fn control_word(&self) -> u16 {
        self.read_u16(FCW)
    }

    pub fn set_control_word(&mut self, fcw: u16) {
        self.write_u16(FCW, fcw);
    }

    /// x87 status word (FSW)
    pub fn status_word(&self) -> u16 {
        self.read_u16(FSW)
    }

    pub fn set_status_word(&mut self, fsw: u16) {
        self.write_u16(FSW, fsw);
    }

    /// SSE control/status register
    pub fn mxcsr(&self) -> u32 {
        self.read_u32(MXCSR)
    }

    pub fn set_mxcsr(&mut self, mxcsr: u32) {
        self.write_u32(MXCSR, mxcsr);
    }

    /// Raw MXCSR_MASK field as stored by `fxsave`.
    pub fn mxcsr_mask(&self) -> u32 {
        self.read_u32(MXCSR_MASK)
    }

    pub fn set_mxcsr_mask(&mut self, mask: u32) {
        self.write_u32(MXCSR_MASK, mask);
    }

    /// MXCSR bits the processor accepts. A zero field means the CPU
    /// predates the mask and uses [`MXCSR_MASK_DEFAULT`].
    pub fn supported_mxcsr_bits(&self) -> u32 {
        match self.mxcsr_mask() {
            0 => MXCSR_MASK_DEFAULT,
            mask => mask,
        }
    }

    /// Zero the eight x87 registers and sixteen XMM registers, leaving the
    /// control and status fields alone.
    pub fn clear_data_registers(&mut self) {
        self.fxsave[ST_SPACE].fill(0);
        self.fxsave[XMM_SPACE].fill(0);
    }

    /// Decode the fault metadata stored in the software area.
    pub fn fault_metadata(&self) -> FaultMetadata {
        FaultMetadata {
            fault_address: self.read_u64(META_FAULT_ADDRESS),
            error_code: self.read_u64(META_ERROR_CODE),
            cs: self.read_u16(META_CS),
            ss: self.read_u16(META_SS),
            ds: self.read_u16(META_DS),
            es: self.read_u16(META_ES),
            fs: self.read_u16(META_FS),
            gs: self.read_u16(META_GS),
            trap_vector: self.read_u32(META_VECTOR),
        }
    }

    /// Encode `meta` into the software area. The rest of the area is
    /// zeroed.
    pub fn set_fault_metadata(&mut self, meta: &FaultMetadata) {
        self.write_u64(META_FAULT_ADDRESS, meta.fault_address);
        self.write_u64(META_ERROR_CODE, meta.error_code);
        self.write_u16(META_CS, meta.cs);
        self.write_u16(META_SS, meta.ss);
        self.write_u16(META_DS, meta.ds);
        self.write_u16(META_ES, meta.es);
        self.write_u16(META_FS, meta.fs);
        self.write_u16(META_GS, meta.gs);
        self.write_u32(META_VECTOR, meta.trap_vector);
        self.fxsave[META_END..].fill(0);
    }
}

impl fmt::Debug for FpuState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FpuState")
            .field("fcw", &format_args!("{:#06x}", self.control_word()))
            .field("fsw", &format_args!("{:#06x}", self.status_word()))
            .field("mxcsr", &format_args!("{:#010x}", self.mxcsr()))
            .field("mxcsr_mask", &format_args!("{:#010x}", self.mxcsr_mask()))
            .finish_non_exhaustive()
    }
}

const _: () = assert!(core::mem::size_of::<FpuState>() == FXSAVE_AREA_SIZE);
const _: () = assert!(core::mem::align_of::<FpuState>() == 64);

/// Canonical reset state shared by every new thread.
static BOOT_TEMPLATE: Once<FpuState> = Once::new();

/// Reset the FPU through `cpu`, then normalize the captured image: force
/// MXCSR to its default and clear every data register.
pub fn build_reset_state<C: CpuOps + ?Sized>(cpu: &C) -> FpuState {
    let mut state = FpuState::zeroed();
    cpu.capture_reset_fpu_state(&mut state);
    state.set_mxcsr(MXCSR_DEFAULT);
    state.clear_data_registers();
    state
}

/// Build, validate and publish the boot template.
///
/// Must run during bring-up on the bootstrap processor before any other
/// core starts; later calls return the already published template. A
/// template that fails validation halts the boot.
pub fn init_boot_template<C: CpuOps + ?Sized>(cpu: &C) -> &'static FpuState {
    BOOT_TEMPLATE.call_once(|| {
        let state = match check_reset_state(cpu) {
            Ok(state) => state,
            Err(reason) => fatal(FatalError::BootTemplateInvalid(reason), None, None),
        };
        log::debug!(
            "[FPU] Boot template published: fcw={:#06x} mxcsr={:#010x}",
            state.control_word(),
            state.mxcsr()
        );
        state
    })
}

/// Read-only view of the published boot template.
pub fn boot_template() -> &'static FpuState {
    match BOOT_TEMPLATE.get() {
        Some(template) => template,
        None => fatal(FatalError::BootTemplateUnpublished, None, None),
    }
}

/// Validation result for an image built by `cpu`, without publishing it.
pub fn check_reset_state<C: CpuOps + ?Sized>(cpu: &C) -> Result<FpuState, FpuFault> {
    let state = build_reset_state(cpu);
    validate_fpu_state(&state).map(|()| state)
}

//! usbdevfs request layout and ioctls.

use std::fs::{File, OpenOptions};
use std::os::fd::{AsRawFd, OwnedFd};
use std::path::Path;

use nix::errno::Errno;

use crate::capture::PACKETS_PER_URB;

use super::pool::{TransferPool, TransferSlot};

pub const USBDEVFS_URB_TYPE_ISO: u8 = 0;
pub const USBDEVFS_URB_ISO_ASAP: u32 = 0x02;

#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct IsoPacketDesc {
    /// Requested bytes.
    pub length: u32,
    pub actual_length: u32,
    pub status: u32,
}

/// Fixed part of `struct usbdevfs_urb`; the kernel declares the packet
/// descriptors as a trailing zero-length array, so the ioctl size covers only
/// this header.
#[repr(C)]
#[derive(Debug)]
pub struct UrbHeader {
    pub kind: u8,
    pub endpoint: u8,
    pub status: i32,
    pub flags: u32,
    pub buffer: *mut libc::c_void,
    pub buffer_length: i32,
    pub actual_length: i32,
    pub start_frame: i32,
    pub number_of_packets: i32,
    pub error_count: i32,
    pub signr: u32,
    pub usercontext: *mut libc::c_void,
}

#[repr(C)]
#[derive(Debug)]
pub struct IsoUrb {
    pub header: UrbHeader,
    pub packets: [IsoPacketDesc; PACKETS_PER_URB],
}

impl IsoUrb {
    pub fn zeroed() -> Self {
        Self {
            header: UrbHeader {
                kind: 0,
                endpoint: 0,
                status: 0,
                flags: 0,
                buffer: std::ptr::null_mut(),
                buffer_length: 0,
                actual_length: 0,
                start_frame: 0,
                number_of_packets: 0,
                error_count: 0,
                signr: 0,
                usercontext: std::ptr::null_mut(),
            },
            packets: [IsoPacketDesc::default(); PACKETS_PER_URB],
        }
    }
}

#[repr(C)]
pub struct SetInterface {
    pub interface: libc::c_uint,
    pub altsetting: libc::c_uint,
}

nix::ioctl_read!(usbdevfs_submiturb, b'U', 10, UrbHeader);
nix::ioctl_write_ptr_bad!(
    usbdevfs_discardurb,
    nix::request_code_none!(b'U', 11),
    UrbHeader
);
nix::ioctl_write_ptr!(usbdevfs_reapurb, b'U', 12, *mut libc::c_void);
nix::ioctl_read!(usbdevfs_claiminterface, b'U', 15, libc::c_uint);
nix::ioctl_read!(usbdevfs_setinterface, b'U', 4, SetInterface);

/// A device that accepts isochronous requests and hands them back on
/// completion.
pub trait IsoEndpoint {
    /// Queue the slot's request with the device.
    fn submit(&mut self, slot: &mut TransferSlot) -> Result<(), Errno>;

    /// Block until any submitted request completes and return its slot index.
    fn reap(&mut self, pool: &mut TransferPool) -> Result<usize, Errno>;

    /// Ask the device to cancel an in-flight request.
    fn discard(&mut self, slot: &mut TransferSlot) -> Result<(), Errno>;
}

/// Linux usbdevfs device node, e.g. `/dev/bus/usb/001/004`.
pub struct UsbdevfsEndpoint {
    fd: OwnedFd,
}

impl UsbdevfsEndpoint {
    pub fn open(path: &Path) -> std::io::Result<Self> {
        let file: File = OpenOptions::new().read(true).write(true).open(path)?;
        Ok(Self { fd: file.into() })
    }

    /// Wraps a descriptor opened elsewhere (for example one handed over by a
    /// permission broker).
    pub fn from_fd(fd: OwnedFd) -> Self {
        Self { fd }
    }

    pub fn claim_interface(&self, interface: u32) -> Result<(), Errno> {
        let mut iface: libc::c_uint = interface;
        // SAFETY: the argument is a valid, live c_uint.
        unsafe { usbdevfs_claiminterface(self.fd.as_raw_fd(), &mut iface) }?;
        Ok(())
    }

    pub fn set_interface(&self, interface: u32, altsetting: u32) -> Result<(), Errno> {
        let mut setif = SetInterface {
            interface,
            altsetting,
        };
        // SAFETY: the argument is a valid, live usbdevfs_setinterface.
        unsafe { usbdevfs_setinterface(self.fd.as_raw_fd(), &mut setif) }?;
        Ok(())
    }
}

impl IsoEndpoint for UsbdevfsEndpoint {
    fn submit(&mut self, slot: &mut TransferSlot) -> Result<(), Errno> {
        let urb: *mut IsoUrb = slot.urb_mut();
        // SAFETY: the request and its buffer are heap allocations owned by the
        // pool and the slot's Arc, which outlive every in-flight request; the
        // kernel only writes to them while reaping.
        loop {
            match unsafe { usbdevfs_submiturb(self.fd.as_raw_fd(), urb.cast::<UrbHeader>()) } {
                Err(Errno::EINTR) => continue,
                Err(e) => return Err(e),
                Ok(_) => return Ok(()),
            }
        }
    }

    fn reap(&mut self, pool: &mut TransferPool) -> Result<usize, Errno> {
        let mut reaped: *mut libc::c_void = std::ptr::null_mut();
        // SAFETY: `reaped` is a valid out-pointer for the completed request address.
        unsafe { usbdevfs_reapurb(self.fd.as_raw_fd(), &mut reaped) }?;
        pool.index_of_urb(reaped as usize).ok_or_else(|| {
            log::error!("Reaped unknown request at {:p}", reaped);
            Errno::EINVAL
        })
    }

    fn discard(&mut self, slot: &mut TransferSlot) -> Result<(), Errno> {
        let urb: *mut IsoUrb = slot.urb_mut();
        // SAFETY: the kernel only uses the address to look up the request.
        unsafe { usbdevfs_discardurb(self.fd.as_raw_fd(), urb.cast::<UrbHeader>()) }?;
        Ok(())
    }
}

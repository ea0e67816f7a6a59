use std::sync::atomic::{AtomicI16, Ordering};
use std::sync::Arc;

use crate::capture::{MAX_SAMPLES_PER_URB, PACKETS_PER_URB, URBS_TO_JUGGLE};
use crate::error::CaptureError;

use super::urb::{IsoPacketDesc, IsoUrb, USBDEVFS_URB_ISO_ASAP, USBDEVFS_URB_TYPE_ISO};

/// Sample storage for one transfer slot.
///
/// Samples are relaxed atomics so the host may read an exported run while the
/// capture thread (or the kernel, on reap) overwrites it. Such reads can be
/// stale or torn across samples but never undefined. `AtomicI16` has the same
/// in-memory representation as `i16`, so the storage doubles as the transfer
/// buffer handed to the device.
pub struct SlotBuffer {
    samples: Box<[AtomicI16]>,
}

impl SlotBuffer {
    pub const GUARD: i16 = 0xFACEu16 as i16;

    pub fn new(capacity: usize) -> Self {
        let samples: Box<[AtomicI16]> = (0..=capacity)
            .map(|i| AtomicI16::new(if i == capacity { Self::GUARD } else { 0 }))
            .collect();
        Self { samples }
    }

    pub fn capacity(&self) -> usize {
        self.samples.len() - 1
    }

    /// Logical samples, excluding the guard.
    pub fn samples(&self) -> &[AtomicI16] {
        &self.samples[..self.capacity()]
    }

    pub fn load(&self, index: usize) -> i16 {
        self.samples()[index].load(Ordering::Relaxed)
    }

    pub fn store(&self, index: usize, value: i16) {
        self.samples()[index].store(value, Ordering::Relaxed);
    }

    /// Copies the first `len` samples into `out`, replacing its contents.
    pub fn snapshot_into(&self, len: usize, out: &mut Vec<i16>) {
        out.clear();
        out.extend(self.samples()[..len].iter().map(|s| s.load(Ordering::Relaxed)));
    }

    pub fn is_intact(&self) -> bool {
        self.samples[self.capacity()].load(Ordering::Relaxed) == Self::GUARD
    }

    pub(crate) fn as_device_ptr(&self) -> *mut libc::c_void {
        self.samples.as_ptr() as *mut libc::c_void
    }
}

/// One reusable isochronous request bound to its own buffer.
pub struct TransferSlot {
    index: usize,
    urb: Box<IsoUrb>,
    buffer: Arc<SlotBuffer>,
}

impl TransferSlot {
    fn new(index: usize, capacity: usize) -> Self {
        Self {
            index,
            urb: Box::new(IsoUrb::zeroed()),
            buffer: Arc::new(SlotBuffer::new(capacity)),
        }
    }

    fn prepare(&mut self, endpoint_address: u8, packet_bytes: u32) {
        let buffer_ptr = self.buffer.as_device_ptr();
        let header = &mut self.urb.header;
        header.kind = USBDEVFS_URB_TYPE_ISO;
        // Input endpoint.
        header.endpoint = endpoint_address | 0x80;
        header.status = 0;
        header.flags = USBDEVFS_URB_ISO_ASAP;
        header.buffer = buffer_ptr;
        header.buffer_length = (packet_bytes as usize * PACKETS_PER_URB) as i32;
        header.actual_length = 0;
        header.start_frame = 0;
        header.number_of_packets = PACKETS_PER_URB as i32;
        header.error_count = 0;
        header.signr = 0;
        header.usercontext = self.index as *mut libc::c_void;

        for packet in self.urb.packets.iter_mut() {
            *packet = IsoPacketDesc {
                length: packet_bytes,
                actual_length: 0,
                status: 0,
            };
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn buffer(&self) -> &Arc<SlotBuffer> {
        &self.buffer
    }

    pub fn packets(&self) -> &[IsoPacketDesc] {
        &self.urb.packets
    }

    pub fn packets_mut(&mut self) -> &mut [IsoPacketDesc] {
        &mut self.urb.packets
    }

    pub fn urb_mut(&mut self) -> &mut IsoUrb {
        &mut self.urb
    }

    pub(crate) fn urb_addr(&self) -> usize {
        &*self.urb as *const IsoUrb as usize
    }
}

/// Fixed set of transfer slots, allocated before the first submission.
pub struct TransferPool {
    slots: Box<[TransferSlot]>,
    packet_bytes: u32,
}

impl TransferPool {
    pub fn new(endpoint_address: u8, max_packet_size: u32) -> Result<Self, CaptureError> {
        Self::with_slots(URBS_TO_JUGGLE, endpoint_address, max_packet_size)
    }

    pub fn with_slots(
        count: usize,
        endpoint_address: u8,
        max_packet_size: u32,
    ) -> Result<Self, CaptureError> {
        let samples_per_packet = max_packet_size as usize / 2;
        if max_packet_size == 0 || samples_per_packet * PACKETS_PER_URB > MAX_SAMPLES_PER_URB {
            log::error!("Max packet size {} does not fit a transfer slot", max_packet_size);
            return Err(CaptureError::InvalidPacketSize(max_packet_size));
        }

        let mut slots: Vec<TransferSlot> = (0..count)
            .map(|i| TransferSlot::new(i, MAX_SAMPLES_PER_URB))
            .collect();
        // Request exactly the endpoint's max packet size. Asking for more or
        // less makes some microphones stall the reap forever.
        for slot in slots.iter_mut() {
            slot.prepare(endpoint_address, max_packet_size);
        }

        Ok(Self {
            slots: slots.into_boxed_slice(),
            packet_bytes: max_packet_size,
        })
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn packet_bytes(&self) -> u32 {
        self.packet_bytes
    }

    pub fn slot(&self, index: usize) -> &TransferSlot {
        &self.slots[index]
    }

    pub fn slot_mut(&mut self, index: usize) -> &mut TransferSlot {
        &mut self.slots[index]
    }

    /// Maps a request address returned by the device back to its slot.
    pub fn index_of_urb(&self, addr: usize) -> Option<usize> {
        self.slots.iter().position(|s| s.urb_addr() == addr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slots_request_exact_packet_size() {
        let pool = TransferPool::new(0x01, 768).unwrap();
        assert_eq!(pool.len(), URBS_TO_JUGGLE);
        for i in 0..pool.len() {
            let slot = pool.slot(i);
            assert_eq!(slot.index(), i);
            assert_eq!(slot.packets().len(), PACKETS_PER_URB);
            assert!(slot.packets().iter().all(|p| p.length == 768));
            assert_eq!(slot.urb.header.endpoint, 0x81);
            assert_eq!(slot.urb.header.usercontext as usize, i);
            assert!(slot.buffer().is_intact());
        }
    }

    #[test]
    fn rejects_oversized_packets() {
        assert!(TransferPool::new(0x01, 0).is_err());
        let too_big = (MAX_SAMPLES_PER_URB / PACKETS_PER_URB * 2 + 2) as u32;
        assert!(TransferPool::new(0x01, too_big).is_err());
    }

    #[test]
    fn urb_addresses_map_back_to_slots() {
        let pool = TransferPool::with_slots(3, 0x02, 100).unwrap();
        for i in 0..3 {
            assert_eq!(pool.index_of_urb(pool.slot(i).urb_addr()), Some(i));
        }
        assert_eq!(pool.index_of_urb(0), None);
    }

    #[test]
    fn buffer_outlives_pool() {
        let pool = TransferPool::with_slots(2, 0x01, 100).unwrap();
        let buffer = Arc::clone(pool.slot(1).buffer());
        buffer.store(0, 42);
        drop(pool);
        assert_eq!(buffer.load(0), 42);
        assert!(buffer.is_intact());
    }
}

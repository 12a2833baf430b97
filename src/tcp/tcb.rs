use std::cmp::Ordering;

use bytes::BytesMut;
use pnet_packet::tcp::TcpFlags::{ACK, FIN, PSH, RST, SYN};

use crate::buffer::FixedBuffer;
use crate::device::DeviceRef;
use crate::tcp::ReadFn;

/// Enum representing the various states of a TCP connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TcpState {
    /// The listening state, waiting for incoming connection requests.
    Listen,
    /// The state after sending a SYN message, awaiting acknowledgment.
    SynSent,
    /// The state after receiving a SYN message and answering with SYN+ACK, awaiting the final ACK.
    SynReceived,
    /// The state after completing the three-way handshake; the connection is established.
    Established,
    /// The state where the connection is in the process of being closed (after sending FIN).
    FinWait1,
    /// The state where the other side has acknowledged the connection termination.
    FinWait2,
    /// The state after receiving a FIN message, waiting for the application to close.
    CloseWait,
    /// Both sides sent FIN at the same time; waiting for the ACK of ours.
    Closing,
    /// The state where the sender has sent the final FIN message and is waiting for acknowledgment from the other side.
    LastAck,
    /// The state after both sides have sent FIN messages, indicating the connection is fully closed.
    TimeWait,
    /// The state where the connection is completely closed.
    Closed,
}

/// Fields of an outgoing segment header other than the ports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct SegmentHeader {
    pub seq: u32,
    pub ack: u32,
    pub flags: u8,
    pub window: u16,
}

/// What the caller has to do after a segment was applied to a [`Tcb`].
#[derive(Debug, Default)]
pub(crate) struct Outcome {
    pub reply: Option<SegmentHeader>,
    /// In-order data for the read callback.
    pub deliver: Option<BytesMut>,
    /// The connection is finished and must be removed.
    pub teardown: bool,
    /// A FIN still has to be processed once the data was delivered.
    pub fin: bool,
}

/// Transmission control block of one connection.
pub(crate) struct Tcb {
    state: TcpState,
    snd_seq: SeqNum,
    snd_ack: SeqNum,
    last_ack: SeqNum,
    needs_ack: bool,
    recv_buffer: FixedBuffer,
    on_read: ReadFn,
    device: DeviceRef,
}

impl Tcb {
    /// LISTEN -> SYN_RECEIVED. Returns the block and the SYN+ACK to send.
    pub fn new_syn_received(peer_seq: u32, on_read: ReadFn, device: DeviceRef, recv_buffer_size: usize) -> (Self, SegmentHeader) {
        let mut tcb = Self {
            state: TcpState::SynReceived,
            snd_seq: SeqNum(1),
            snd_ack: SeqNum(peer_seq).add_num(1),
            last_ack: SeqNum(1),
            needs_ack: false,
            recv_buffer: FixedBuffer::with_capacity(recv_buffer_size),
            on_read,
            device,
        };
        let reply = tcb.header(SYN | ACK);
        // the SYN occupies one sequence number
        tcb.snd_seq = tcb.snd_seq.add_num(1);
        (tcb, reply)
    }
    pub fn state(&self) -> TcpState {
        self.state
    }
    pub fn device(&self) -> &DeviceRef {
        &self.device
    }
    pub fn on_read(&self) -> ReadFn {
        self.on_read.clone()
    }
    #[cfg(test)]
    pub fn snd_seq(&self) -> u32 {
        self.snd_seq.0
    }
    #[cfg(test)]
    pub fn snd_ack(&self) -> u32 {
        self.snd_ack.0
    }
    #[cfg(test)]
    pub fn last_ack(&self) -> u32 {
        self.last_ack.0
    }
    pub fn rcv_wnd(&self) -> u16 {
        self.recv_buffer.available().min(u16::MAX as usize) as u16
    }
    pub fn is_sendable(&self) -> bool {
        matches!(self.state, TcpState::Established | TcpState::CloseWait)
    }
    fn header(&self, flags: u8) -> SegmentHeader {
        SegmentHeader {
            seq: self.snd_seq.0,
            ack: self.snd_ack.0,
            flags,
            window: self.rcv_wnd(),
        }
    }
    /// Applies the flags, acknowledgement and payload of an inbound segment.
    ///
    /// A FIN is only recorded in the outcome; it has to be finished with
    /// [`finish_segment`](Tcb::finish_segment) after any delivered data was
    /// handed to the application.
    pub fn push_segment(&mut self, flags: u8, seq: u32, ack: u32, payload: &[u8]) -> Outcome {
        let mut outcome = Outcome::default();
        if flags & RST == RST {
            self.state = TcpState::Closed;
            outcome.teardown = true;
            return outcome;
        }
        if flags & SYN == SYN {
            if self.state == TcpState::SynReceived {
                // our SYN+ACK was lost, answer again
                let mut reply = self.header(SYN | ACK);
                reply.seq = self.snd_seq.sub_num(1).0;
                outcome.reply = Some(reply);
            } else {
                log::debug!("unexpected syn in {:?}", self.state);
            }
            return outcome;
        }
        if flags & ACK == ACK {
            let ack = SeqNum(ack);
            if ack >= self.last_ack {
                self.last_ack = ack;
            }
            match self.state {
                TcpState::SynReceived => self.state = TcpState::Established,
                TcpState::FinWait1 if ack >= self.snd_seq => self.state = TcpState::FinWait2,
                TcpState::Closing => {
                    self.state = TcpState::TimeWait;
                    outcome.teardown = true;
                    return outcome;
                }
                TcpState::LastAck => {
                    self.state = TcpState::Closed;
                    outcome.teardown = true;
                    return outcome;
                }
                _ => {}
            }
        }
        if !payload.is_empty() {
            if !matches!(
                self.state,
                TcpState::Established | TcpState::FinWait1 | TcpState::FinWait2
            ) {
                log::debug!("data in {:?} dropped", self.state);
                return outcome;
            }
            if !self.recv_buffer.try_extend(payload) {
                log::warn!(
                    "tcp receive buffer overflow, {} bytes dropped,seq={seq}",
                    payload.len()
                );
                return outcome;
            }
            self.snd_ack = self.snd_ack.add_num(payload.len() as u32);
            self.needs_ack = true;
            outcome.deliver = Some(self.recv_buffer.take());
        }
        outcome.fin = flags & FIN == FIN;
        outcome
    }
    /// Completes a segment: answers a pending FIN, or acknowledges delivered
    /// data the application did not answer itself.
    pub fn finish_segment(&mut self, fin: bool) -> Outcome {
        let mut outcome = Outcome::default();
        if fin {
            match self.state {
                TcpState::Established => {
                    // ESTABLISHED -> LAST_ACK, skipping CLOSE_WAIT
                    self.snd_ack = self.snd_ack.add_num(1);
                    outcome.reply = Some(self.header(FIN | ACK));
                    self.snd_seq = self.snd_seq.add_num(1);
                    self.state = TcpState::LastAck;
                }
                TcpState::FinWait1 => {
                    self.snd_ack = self.snd_ack.add_num(1);
                    outcome.reply = Some(self.header(ACK));
                    self.state = TcpState::Closing;
                }
                TcpState::FinWait2 => {
                    self.snd_ack = self.snd_ack.add_num(1);
                    outcome.reply = Some(self.header(ACK));
                    self.state = TcpState::TimeWait;
                    outcome.teardown = true;
                }
                state => log::debug!("fin in {state:?} ignored"),
            }
            self.needs_ack = false;
            return outcome;
        }
        if self.needs_ack {
            self.needs_ack = false;
            outcome.reply = Some(self.header(ACK));
        }
        outcome
    }
    /// Header for application data. Nothing changes until
    /// [`commit_send`](Tcb::commit_send) records the segment as sent.
    pub fn send_header(&self) -> SegmentHeader {
        self.header(PSH | ACK)
    }
    /// `len` bytes went out with the header from `send_header`.
    pub fn commit_send(&mut self, len: usize) {
        self.snd_seq = self.snd_seq.add_num(len as u32);
        self.needs_ack = false;
    }
    /// Header of our FIN, `None` if there is nothing to close.
    pub fn close_header(&self) -> Option<SegmentHeader> {
        match self.state {
            TcpState::Established | TcpState::SynReceived => Some(self.header(FIN | PSH | ACK)),
            _ => None,
        }
    }
    /// ESTABLISHED -> FIN_WAIT_1 once the FIN from `close_header` was sent.
    pub fn commit_close(&mut self) {
        self.snd_seq = self.snd_seq.add_num(1);
        self.needs_ack = false;
        self.state = TcpState::FinWait1;
    }
}

/// RST answering a segment that has no connection to go to.
pub(crate) fn reset(flags: u8, seq: u32, ack: u32) -> SegmentHeader {
    if flags & ACK == ACK {
        SegmentHeader {
            seq: ack,
            ack: 0,
            flags: RST,
            window: 0,
        }
    } else {
        SegmentHeader {
            seq: 0,
            ack: seq.wrapping_add(1),
            flags: RST | ACK,
            window: 0,
        }
    }
}

const MAX_DIFF: u32 = u32::MAX / 2;

#[derive(Eq, PartialEq, Debug, Copy, Clone)]
struct SeqNum(u32);

impl PartialOrd for SeqNum {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for SeqNum {
    fn cmp(&self, other: &Self) -> Ordering {
        let diff = self.0.wrapping_sub(other.0);
        if diff == 0 {
            Ordering::Equal
        } else if diff < MAX_DIFF {
            Ordering::Greater
        } else {
            Ordering::Less
        }
    }
}

impl SeqNum {
    fn add_num(self, n: u32) -> Self {
        SeqNum(self.0.wrapping_add(n))
    }
    fn sub_num(self, n: u32) -> Self {
        SeqNum(self.0.wrapping_sub(n))
    }
}

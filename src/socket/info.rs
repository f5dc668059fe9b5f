//! `getsockopt(TCP_INFO)` (spec.md §9 Supplemented features), grounded on
//! ClickNF's `tcpinfo.hh`/`tcpinfo.cc`: a point-in-time snapshot of
//! connection statistics pulled straight off `ConnState`.

use crate::tcp::state::{ConnState, State};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TcpInfo {
    pub state: State,
    pub cwnd: u32,
    pub ssthresh: u32,
    pub snd_mss: u16,
    pub rtt_us: u64,
    pub rttvar_us: u64,
    pub rto_us: u64,
    pub retransmits: u8,
    pub bytes_in_flight: u32,
}

impl TcpInfo {
    pub fn snapshot(st: &ConnState) -> TcpInfo {
        TcpInfo {
            state: st.state,
            cwnd: st.cong.cwnd,
            ssthresh: st.cong.ssthresh,
            snd_mss: st.snd_mss,
            rtt_us: st.rtt_estimator.srtt().map(|d| d.total_micros()).unwrap_or(0),
            rttvar_us: st.rto.rttvar.total_micros(),
            rto_us: st.rto.rto.total_micros(),
            retransmits: st.cong.rtx_count,
            bytes_in_flight: st.bytes_in_flight() as u32,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tcp::congestion::CongestionAlgo;
    use crate::tcp::state::Flow;
    use crate::wire::IpAddress;

    #[test]
    fn snapshot_reflects_congestion_fields() {
        let flow = Flow {
            local_addr: IpAddress::v4(10, 0, 0, 1),
            local_port: 80,
            remote_addr: IpAddress::v4(10, 0, 0, 2),
            remote_port: 4000,
        };
        let mut st = ConnState::new(flow, 0, CongestionAlgo::NewReno.build(1460, u32::MAX));
        st.cong.cwnd = 4380;
        let info = TcpInfo::snapshot(&st);
        assert_eq!(info.cwnd, 4380);
        assert_eq!(info.state, State::Closed);
    }
}

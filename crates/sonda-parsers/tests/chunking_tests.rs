//! Chunk-partition independence for every parser: feeding identical bytes
//! cut at arbitrary boundaries must yield identical final structures, and a
//! repeated final flush must change nothing.

use sonda_parsers::{DigParser, MtrParser, PingParser, TracerouteParser};
use std::collections::BTreeMap;

const DIG_OUTPUT: &str = "\
; <<>> DiG 9.18.12 <<>> example.com -t MX
;; Got answer:

;; ANSWER SECTION:
example.com.\t3600\tIN\tMX\t10 mail.example.com.
example.com.\t3600\tIN\tMX\t20 backup.example.com.

;; Query time: 23 msec
;; SERVER: 1.1.1.1#53(1.1.1.1) (UDP)
";

const PING_OUTPUT: &str = "\
PING example.com (93.184.216.34) 56(84) bytes of data.
64 bytes from 93.184.216.34: icmp_seq=1 ttl=56 time=88.1 ms
64 bytes from 93.184.216.34: icmp_seq=2 ttl=56 time=87.9 ms

--- example.com ping statistics ---
2 packets transmitted, 2 received, 0% packet loss, time 1001ms
rtt min/avg/max/mdev = 87.900/88.000/88.100/0.100 ms
";

const TRACEROUTE_OUTPUT: &str = "\
traceroute to example.com (93.184.216.34), 30 hops max, 60 byte packets
 1  gw.example (203.0.114.1)  0.4 ms  0.3 ms  0.3 ms
 2  * * *
 3  93.184.216.34 (93.184.216.34)  88.0 ms  87.9 ms  88.1 ms
";

const MTR_OUTPUT: &str = "\
x 0 1
h 0 203.0.114.1
p 0 400
d 0 gw.example
x 1 2
x 2 3
h 2 93.184.216.34
p 2 88000
";

fn partitions(input: &str) -> Vec<Vec<&str>> {
    let mut out = Vec::new();
    for size in [1usize, 3, 7, 64, input.len()] {
        out.push(
            input
                .as_bytes()
                .chunks(size)
                .map(|c| std::str::from_utf8(c).unwrap())
                .collect(),
        );
    }
    out.push(input.split_inclusive('\n').collect());
    out
}

#[test]
fn dig_partition_independent() {
    let mut reference = DigParser::new(false);
    reference.push(DIG_OUTPUT);
    reference.finish();

    for partition in partitions(DIG_OUTPUT) {
        let mut parser = DigParser::new(false);
        for chunk in partition {
            parser.push(chunk);
        }
        parser.finish();
        parser.finish();

        assert_eq!(parser.answers(), reference.answers());
        assert_eq!(parser.resolver(), reference.resolver());
        assert_eq!(parser.total_time_ms(), reference.total_time_ms());
        assert_eq!(parser.raw_output(), DIG_OUTPUT);
    }
}

#[test]
fn ping_partition_independent() {
    let mut reference = PingParser::new();
    reference.push(PING_OUTPUT);
    reference.finish();

    for partition in partitions(PING_OUTPUT) {
        let mut parser = PingParser::new();
        for chunk in partition {
            parser.push(chunk);
        }
        parser.finish();
        parser.finish();

        assert_eq!(parser.times(), reference.times());
        assert_eq!(parser.loss(), reference.loss());
        assert_eq!(parser.avg(), reference.avg());
        assert_eq!(parser.resolved_address(), reference.resolved_address());
        assert_eq!(parser.raw_output(), PING_OUTPUT);
    }
}

#[test]
fn traceroute_partition_independent() {
    let mut reference = TracerouteParser::new();
    reference.push(TRACEROUTE_OUTPUT);
    reference.finish();

    for partition in partitions(TRACEROUTE_OUTPUT) {
        let mut parser = TracerouteParser::new();
        for chunk in partition {
            parser.push(chunk);
        }
        parser.finish();
        parser.finish();

        assert_eq!(parser.hops(), reference.hops());
        assert_eq!(parser.resolved_address(), reference.resolved_address());
        assert_eq!(parser.raw_output(), TRACEROUTE_OUTPUT);
    }
}

#[test]
fn mtr_partition_independent() {
    let asn = BTreeMap::new();
    let mut reference = MtrParser::new();
    reference.push(MTR_OUTPUT);
    reference.finish();

    for partition in partitions(MTR_OUTPUT) {
        let mut parser = MtrParser::new();
        for chunk in partition {
            parser.push(chunk);
        }
        parser.finish();
        parser.finish();

        assert_eq!(parser.hops(&asn), reference.hops(&asn));
        assert_eq!(parser.render(&asn), reference.render(&asn));
        assert_eq!(parser.last_hop(), reference.last_hop());
    }
}

#[test]
fn mtr_hop_indices_are_dense() {
    let asn = BTreeMap::new();
    let mut parser = MtrParser::new();
    parser.push(MTR_OUTPUT);
    parser.finish();

    let hops = parser.hops(&asn);
    assert_eq!(hops.len(), 3);
    // hop 2 (index 1) never answered but keeps its slot
    assert!(hops[1].resolved_address.is_none());
    assert_eq!(hops[1].stats.loss, 100.0);
}

//! Static synthetic output for development and demos.
//!
//! Enabled with `params.fake_output`. Output depends only on the query, so
//! repeated calls are identical.

use periscope_core::{Query, QueryType};
use serde_json::json;

use super::EngineOutput;

const FAKE_AS_PATH: [u32; 3] = [64496, 64511, 65551];

/// Produce deterministic output for `query`.
pub fn fake_output(query: &Query, structured: bool) -> EngineOutput {
    if structured {
        EngineOutput::Structured(fake_structured(query))
    } else {
        EngineOutput::Text(fake_text(query))
    }
}

fn fake_structured(query: &Query) -> serde_json::Value {
    json!({
        "vrf": query.query_vrf,
        "count": 1,
        "winning_weight": "high",
        "routes": [{
            "prefix": query.query_target,
            "active": true,
            "age": 1_025_100,
            "weight": 170,
            "med": 0,
            "local_preference": 100,
            "as_path": FAKE_AS_PATH,
            "communities": ["65000:1", "65000:2"],
            "next_hop": "198.51.100.1",
            "source_as": FAKE_AS_PATH[FAKE_AS_PATH.len() - 1],
            "source_rid": "198.51.100.254",
            "peer_rid": "198.51.100.1",
            "rpki_state": 1,
        }],
    })
}

fn fake_text(query: &Query) -> String {
    let target = &query.query_target;
    match query.query_type {
        QueryType::Ping => format!(
            "PING {target}: 56 data bytes\n\
             64 bytes from {target}: icmp_seq=0 ttl=59 time=4.102 ms\n\
             64 bytes from {target}: icmp_seq=1 ttl=59 time=4.087 ms\n\
             64 bytes from {target}: icmp_seq=2 ttl=59 time=4.110 ms\n\
             64 bytes from {target}: icmp_seq=3 ttl=59 time=4.095 ms\n\
             64 bytes from {target}: icmp_seq=4 ttl=59 time=4.099 ms\n\
             \n\
             --- {target} ping statistics ---\n\
             5 packets transmitted, 5 packets received, 0% packet loss\n\
             round-trip min/avg/max/stddev = 4.087/4.099/4.110/0.008 ms\n"
        ),
        QueryType::Traceroute => format!(
            "traceroute to {target}, 30 hops max, 52 byte packets\n \
             1  198.51.100.1  0.412 ms  0.388 ms  0.401 ms\n \
             2  203.0.113.9  1.928 ms  1.907 ms  1.933 ms\n \
             3  {target}  4.101 ms  4.095 ms  4.112 ms\n"
        ),
        QueryType::BgpRoute | QueryType::BgpCommunity | QueryType::BgpAspath => {
            let path = FAKE_AS_PATH
                .iter()
                .map(u32::to_string)
                .collect::<Vec<_>>()
                .join(" ");
            format!(
                "{vrf}.inet.0: 1 destinations, 1 routes (1 active, 0 holddown, 0 hidden)\n\
                 + = Active Route, - = Last Active, * = Both\n\
                 \n\
                 {target}\n    \
                 *[BGP/170] 11w6d 20:45:00, localpref 100, from 198.51.100.1\n      \
                 AS path: {path} I, validation-state: valid\n    \
                 > to 198.51.100.1 via xe-0/0/0.0\n",
                vrf = query.query_vrf,
            )
        }
    }
}

//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::net::Ipv6Addr;
use std::time::Duration;

use bytes::Bytes;
use const_addrs::{ip6, net6};
use holo_thread::config::LeaderCfg;
use holo_thread::context_ids::ContextIdState;
use holo_thread::error::ErrorKind;
use holo_thread::instance::Instance;
use holo_thread::leader::{Leader, MatchMode};
use holo_thread::mle::{RouterInfo, RouterTableSnapshot};
use holo_thread::packet::consts::THREAD_ENTERPRISE_NUMBER;
use holo_thread::packet::meshcop::{self, CommissioningState, MeshcopTlv};
use holo_thread::packet::tlv::{
    BorderRouterEntry, BorderRouterFlags, BorderRouterTlv,
    CommissioningDataTlv, ContextTlv, HasRouteEntry, HasRouteFlags,
    HasRouteTlv, PrefixSubTlv, PrefixTlv, RoutePreference, ServerTlv,
    ServiceSubTlv, ServiceTlv, UnknownTlv,
};
use holo_thread::packet::{NetDataTlv, NetworkData};
use holo_thread::tasks::messages::input::{
    CommissioningGetMsg, RemoveBorderRouterMsg, ServerDataMsg,
};
use holo_thread::tasks::messages::{ProtocolInputMsg, ProtocolOutputMsg};
use ipnetwork::Ipv6Network;
use tokio::sync::mpsc;

const RLOC_A: u16 = 0x4001;
const RLOC_B: u16 = 0x5001;
const RLOC_C: u16 = 0x6000;

const DFLT_ROUTE_FLAGS: BorderRouterFlags = BorderRouterFlags::DEFAULT_ROUTE
    .union(BorderRouterFlags::ON_MESH)
    .union(BorderRouterFlags::SLAAC)
    .union(BorderRouterFlags::PREFERRED);

//
// Helper functions.
//

fn router_table() -> RouterTableSnapshot {
    RouterTableSnapshot {
        rloc16: 0x0000,
        leader_rloc16: 0x0000,
        routers: vec![
            RouterInfo::new(0, 0),
            RouterInfo::new(16, 1),
            RouterInfo::new(20, 2),
            RouterInfo::new(24, 3),
        ],
        ..Default::default()
    }
}

fn leader() -> Leader {
    Leader::new(LeaderCfg::default())
}

fn border_router(
    stable: bool,
    rloc16: u16,
    preference: RoutePreference,
    flags: BorderRouterFlags,
) -> PrefixSubTlv {
    PrefixSubTlv::BorderRouter(BorderRouterTlv {
        stable,
        entries: vec![BorderRouterEntry::new(rloc16, preference, flags)],
    })
}

fn has_route(
    stable: bool,
    rloc16: u16,
    preference: RoutePreference,
) -> PrefixSubTlv {
    PrefixSubTlv::HasRoute(HasRouteTlv {
        stable,
        entries: vec![HasRouteEntry::new(
            rloc16,
            preference,
            HasRouteFlags::empty(),
        )],
    })
}

fn prefix(prefix: Ipv6Network, sub_tlvs: Vec<PrefixSubTlv>) -> NetDataTlv {
    let stable = sub_tlvs.iter().any(|stlv| stlv.stable());
    NetDataTlv::Prefix(PrefixTlv {
        stable,
        domain_id: 0,
        prefix,
        sub_tlvs,
    })
}

fn service(service_data: &[u8], stable: bool, rloc16: u16) -> NetDataTlv {
    NetDataTlv::Service(ServiceTlv {
        stable,
        service_id: 0,
        enterprise_number: THREAD_ENTERPRISE_NUMBER,
        service_data: Bytes::copy_from_slice(service_data),
        sub_tlvs: vec![ServiceSubTlv::Server(ServerTlv::new(
            stable,
            rloc16,
            Bytes::new(),
        ))],
    })
}

fn encode(tlvs: Vec<NetDataTlv>) -> Vec<u8> {
    NetworkData { tlvs }.encode().to_vec()
}

fn register(
    leader: &mut Leader,
    rt: &RouterTableSnapshot,
    rloc16: u16,
    tlvs: Vec<NetDataTlv>,
) -> Result<(), ErrorKind> {
    leader
        .register_network_data(rt, rloc16, &encode(tlvs))
        .map_err(|error| error.kind())
}

fn route(
    leader: &Leader,
    rt: &RouterTableSnapshot,
    source: &Ipv6Addr,
    destination: &Ipv6Addr,
) -> Result<u16, ErrorKind> {
    leader
        .route_lookup(rt, source, destination)
        .map_err(|error| error.kind())
}

fn anycast(
    leader: &Leader,
    rt: &RouterTableSnapshot,
    aloc16: u16,
) -> Result<u16, ErrorKind> {
    leader.anycast_lookup(rt, aloc16).map_err(|error| error.kind())
}

fn prefix_8(idx: u16) -> Ipv6Network {
    let addr = Ipv6Addr::new(0x2000 + (idx << 8), 0, 0, 0, 0, 0, 0, 0);
    Ipv6Network::new(addr, 8).unwrap()
}

fn prefix_64(idx: u16) -> Ipv6Network {
    let addr = Ipv6Addr::new(0x2001, 0x0db8, idx, 0, 0, 0, 0, 0);
    Ipv6Network::new(addr, 64).unwrap()
}

fn commissioning_tlvs(tlvs: &[(u8, &[u8])]) -> Vec<u8> {
    let tlvs = tlvs
        .iter()
        .map(|(tlv_type, value)| {
            MeshcopTlv::new(*tlv_type, Bytes::copy_from_slice(value))
        })
        .collect::<Vec<_>>();
    meshcop::encode_list(&tlvs).to_vec()
}

fn assert_no_empty_containers(netdata: &NetworkData) {
    for tlv in &netdata.tlvs {
        match tlv {
            NetDataTlv::Prefix(prefix) => {
                assert!(!prefix.sub_tlvs.is_empty());
                for stlv in &prefix.sub_tlvs {
                    match stlv {
                        PrefixSubTlv::HasRoute(stlv) => {
                            assert!(!stlv.entries.is_empty())
                        }
                        PrefixSubTlv::BorderRouter(stlv) => {
                            assert!(!stlv.entries.is_empty())
                        }
                        _ => (),
                    }
                }
            }
            NetDataTlv::Service(service) => {
                assert!(service.servers().next().is_some());
            }
            _ => (),
        }
    }
}

//
// Tests.
//

#[test]
fn test_register_two_border_routers() {
    let rt = router_table();
    let mut leader = leader();
    let (v0, sv0) = (leader.version(), leader.stable_version());

    // Router A: stable default route with high preference.
    let data_a = vec![prefix(
        net6!("2001:db8::/64"),
        vec![border_router(true, RLOC_A, RoutePreference::High, DFLT_ROUTE_FLAGS)],
    )];
    register(&mut leader, &rt, RLOC_A, data_a).unwrap();
    assert_eq!(leader.version(), v0.wrapping_add(1));
    assert_eq!(leader.stable_version(), sv0.wrapping_add(1));

    let prefix_tlv = leader
        .network_data()
        .find_prefix(&net6!("2001:db8::/64"))
        .unwrap();
    assert_eq!(
        prefix_tlv.context(),
        Some(&ContextTlv::new(true, true, 1, 64))
    );
    assert_eq!(leader.context_ids().state(1), Some(ContextIdState::InUse));

    // Router B: non-stable default route with medium preference.
    let data_b = vec![prefix(
        net6!("2001:db8::/64"),
        vec![border_router(
            false,
            RLOC_B,
            RoutePreference::Medium,
            DFLT_ROUTE_FLAGS,
        )],
    )];
    register(&mut leader, &rt, RLOC_B, data_b).unwrap();
    assert_eq!(leader.version(), v0.wrapping_add(2));
    assert_eq!(leader.stable_version(), sv0.wrapping_add(1));

    let netdata = leader.network_data();
    assert_eq!(netdata.prefixes().count(), 1);
    let prefix_tlv = netdata.prefixes().next().unwrap();
    assert_eq!(prefix_tlv.border_routers().count(), 2);
    assert_eq!(leader.context_ids().unallocated_id(), Some(2));

    // The higher preference wins for any destination.
    let source = ip6!("2001:db8::1");
    for destination in [ip6!("2600::1"), ip6!("2001:db8::2"), ip6!("fd00::1")] {
        assert_eq!(route(&leader, &rt, &source, &destination), Ok(RLOC_A));
    }

    // Router A leaves. Router B still references the prefix, so the context
    // stays in use.
    leader.remove_border_router(RLOC_A, MatchMode::Rloc16);
    let prefix_tlv = leader.network_data().prefixes().next().unwrap();
    assert!(prefix_tlv.border_router(true).is_none());
    assert_eq!(
        prefix_tlv.border_router(false).unwrap().entries[0].rloc16,
        RLOC_B
    );
    let context = leader.context_by_id(&rt, 1).unwrap();
    assert!(context.compress);
    assert_eq!(leader.context_ids().state(1), Some(ContextIdState::InUse));
    assert_eq!(
        route(&leader, &rt, &source, &ip6!("2600::1")),
        Ok(RLOC_B)
    );
    assert_no_empty_containers(leader.network_data());
}

#[tokio::test(start_paused = true)]
async fn test_context_reuse_delay() {
    let rt = router_table();
    let mut leader = leader();
    let delay = LeaderCfg::default().context_id_reuse_delay();

    let p = net6!("2001:db8::/64");
    register(
        &mut leader,
        &rt,
        RLOC_A,
        vec![prefix(
            p,
            vec![border_router(true, RLOC_A, RoutePreference::High, DFLT_ROUTE_FLAGS)],
        )],
    )
    .unwrap();
    register(
        &mut leader,
        &rt,
        RLOC_B,
        vec![prefix(p, vec![has_route(false, RLOC_B, RoutePreference::Medium)])],
    )
    .unwrap();

    // The last Border Router leaves.
    leader.remove_border_router(RLOC_A, MatchMode::Rloc16);
    let context = leader.context_by_id(&rt, 1).unwrap();
    assert!(!context.compress);
    assert!(matches!(
        leader.context_ids().state(1),
        Some(ContextIdState::PendingRemoval(_))
    ));
    assert!(leader.context_reuse_deadline().is_some());

    // A pending Context ID isn't handed out again.
    register(
        &mut leader,
        &rt,
        RLOC_C,
        vec![prefix(
            net6!("2001:db8:1::/64"),
            vec![border_router(true, RLOC_C, RoutePreference::Medium, DFLT_ROUTE_FLAGS)],
        )],
    )
    .unwrap();
    let context = leader
        .context_by_address(&rt, &ip6!("2001:db8:1::1"))
        .unwrap();
    assert_eq!(context.context_id, 2);

    // Nothing happens before the delay expires.
    tokio::time::advance(delay - Duration::from_secs(1)).await;
    leader.handle_context_reuse_timer();
    assert!(leader.context_by_id(&rt, 1).is_some());

    let (v0, sv0) = (leader.version(), leader.stable_version());
    tokio::time::advance(Duration::from_secs(1)).await;
    leader.handle_context_reuse_timer();
    assert!(leader.context_by_id(&rt, 1).is_none());
    assert_eq!(
        leader.context_ids().state(1),
        Some(ContextIdState::Unallocated)
    );
    assert_eq!(leader.version(), v0.wrapping_add(1));
    assert_eq!(leader.stable_version(), sv0.wrapping_add(1));
    assert_eq!(leader.context_reuse_deadline(), None);

    // Only Router B's entry is left on the prefix.
    let prefix_tlv = leader.network_data().find_prefix(&p).unwrap();
    assert_eq!(prefix_tlv.sub_tlvs, vec![has_route(
        false,
        RLOC_B,
        RoutePreference::Medium
    )]);
    assert_no_empty_containers(leader.network_data());
}

#[tokio::test(start_paused = true)]
async fn test_context_reused_before_expiry() {
    let rt = router_table();
    let mut leader = leader();
    let p = net6!("2001:db8::/64");
    let data = vec![prefix(
        p,
        vec![border_router(true, RLOC_A, RoutePreference::High, DFLT_ROUTE_FLAGS)],
    )];

    register(&mut leader, &rt, RLOC_A, data.clone()).unwrap();
    leader.remove_border_router(RLOC_A, MatchMode::Rloc16);

    // The prefix comes back while its context is pending removal.
    tokio::time::advance(Duration::from_secs(60)).await;
    register(&mut leader, &rt, RLOC_A, data).unwrap();
    let context = leader.context_by_id(&rt, 1).unwrap();
    assert!(context.compress);
    assert_eq!(leader.context_ids().state(1), Some(ContextIdState::InUse));

    tokio::time::advance(LeaderCfg::default().context_id_reuse_delay()).await;
    leader.handle_context_reuse_timer();
    assert!(leader.context_by_id(&rt, 1).is_some());
}

#[test]
fn test_rloc_isolation() {
    let rt = router_table();
    let mut leader = leader();
    let p1 = net6!("2001:db8:1::/64");
    let p2 = net6!("fd00:1::/48");
    let p3 = net6!("fd00:2::/48");

    register(
        &mut leader,
        &rt,
        RLOC_A,
        vec![
            prefix(
                p1,
                vec![border_router(true, RLOC_A, RoutePreference::Medium, DFLT_ROUTE_FLAGS)],
            ),
            prefix(p2, vec![has_route(true, RLOC_A, RoutePreference::Low)]),
            service(&[0x01], true, RLOC_A),
        ],
    )
    .unwrap();
    register(
        &mut leader,
        &rt,
        RLOC_B,
        vec![prefix(p2, vec![has_route(true, RLOC_B, RoutePreference::High)])],
    )
    .unwrap();

    // Router A replaces its registration.
    register(
        &mut leader,
        &rt,
        RLOC_A,
        vec![
            prefix(p2, vec![has_route(true, RLOC_A, RoutePreference::High)]),
            prefix(p3, vec![has_route(false, RLOC_A, RoutePreference::Medium)]),
        ],
    )
    .unwrap();

    let netdata = leader.network_data();
    // Only the context is left on the first prefix.
    let prefix_tlv = netdata.find_prefix(&p1).unwrap();
    assert_eq!(prefix_tlv.border_routers().count(), 0);
    assert!(!prefix_tlv.context().unwrap().compress);
    // The old entry with low preference was replaced.
    let prefix_tlv = netdata.find_prefix(&p2).unwrap();
    let entries = &prefix_tlv.has_route(true).unwrap().entries;
    assert_eq!(entries.len(), 2);
    assert!(entries.contains(&HasRouteEntry::new(
        RLOC_A,
        RoutePreference::High,
        HasRouteFlags::empty()
    )));
    assert!(entries.contains(&HasRouteEntry::new(
        RLOC_B,
        RoutePreference::High,
        HasRouteFlags::empty()
    )));
    assert!(netdata.find_prefix(&p3).is_some());
    assert_eq!(netdata.services().count(), 0);
    assert_no_empty_containers(netdata);
}

#[test]
fn test_noop_registration() {
    let rt = router_table();
    let mut leader = leader();
    let data = vec![
        prefix(
            net6!("2001:db8::/64"),
            vec![
                border_router(true, RLOC_A, RoutePreference::High, DFLT_ROUTE_FLAGS),
                has_route(false, RLOC_A, RoutePreference::Medium),
            ],
        ),
        service(&[0x5c], true, RLOC_A),
    ];

    register(&mut leader, &rt, RLOC_A, data.clone()).unwrap();
    let netdata = leader.network_data().clone();
    let (v0, sv0) = (leader.version(), leader.stable_version());

    register(&mut leader, &rt, RLOC_A, data).unwrap();
    assert_eq!(*leader.network_data(), netdata);
    assert_eq!(leader.version(), v0);
    assert_eq!(leader.stable_version(), sv0);
}

#[test]
fn test_non_stable_change() {
    let rt = router_table();
    let mut leader = leader();
    let (v0, sv0) = (leader.version(), leader.stable_version());

    register(
        &mut leader,
        &rt,
        RLOC_A,
        vec![prefix(
            net6!("fd00::/8"),
            vec![has_route(false, RLOC_A, RoutePreference::Medium)],
        )],
    )
    .unwrap();
    assert_eq!(leader.version(), v0.wrapping_add(1));
    assert_eq!(leader.stable_version(), sv0);

    leader.remove_border_router(RLOC_A, MatchMode::Rloc16);
    assert_eq!(leader.version(), v0.wrapping_add(2));
    assert_eq!(leader.stable_version(), sv0);
    assert!(leader.network_data().is_empty());
}

#[test]
fn test_fail_closed_parsing() {
    let rt = router_table();
    let mut leader = leader();
    register(
        &mut leader,
        &rt,
        RLOC_A,
        vec![prefix(
            net6!("2001:db8::/64"),
            vec![border_router(true, RLOC_A, RoutePreference::High, DFLT_ROUTE_FLAGS)],
        )],
    )
    .unwrap();
    let bytes = leader.network_data().encode();
    let (v0, sv0) = (leader.version(), leader.stable_version());

    // The Has Route sub-TLV overruns its Prefix TLV.
    let data = [
        0x02, 0x09, 0x00, 0x20, 0xfd, 0x00, 0xbe, 0xef, 0x00, 0x06, 0x40,
    ];
    let error = leader.register_network_data(&rt, RLOC_A, &data).unwrap_err();
    assert_eq!(error.kind(), ErrorKind::Parse);
    assert_eq!(leader.network_data().encode(), bytes);
    assert_eq!((leader.version(), leader.stable_version()), (v0, sv0));
}

#[test]
fn test_invalid_registrations() {
    let rt = router_table();
    let mut leader = leader();
    let p = net6!("2001:db8::/64");

    // Entry registered on behalf of another node.
    let data = vec![prefix(p, vec![has_route(true, RLOC_B, RoutePreference::High)])];
    assert_eq!(register(&mut leader, &rt, RLOC_A, data), Err(ErrorKind::Parse));

    // Duplicate prefix.
    let data = vec![
        prefix(p, vec![has_route(true, RLOC_A, RoutePreference::High)]),
        prefix(p, vec![has_route(false, RLOC_A, RoutePreference::High)]),
    ];
    assert_eq!(register(&mut leader, &rt, RLOC_A, data), Err(ErrorKind::Parse));

    // Two sub-TLVs of the same type and stability.
    let data = vec![prefix(
        p,
        vec![
            has_route(true, RLOC_A, RoutePreference::High),
            has_route(true, RLOC_A, RoutePreference::Low),
        ],
    )];
    assert_eq!(register(&mut leader, &rt, RLOC_A, data), Err(ErrorKind::Parse));

    // From an unallocated router ID.
    let data = vec![prefix(p, vec![has_route(true, 0x8000, RoutePreference::High)])];
    assert_eq!(
        register(&mut leader, &rt, 0x8000, data),
        Err(ErrorKind::NoRoute)
    );

    assert!(leader.network_data().is_empty());
}

#[test]
fn test_registration_without_entries() {
    let rt = router_table();
    let mut leader = leader();
    let p1 = net6!("2001:db8:1::/64");
    let p2 = net6!("2001:db8:2::/64");

    // A prefix carrying only an unknown sub-TLV and a service without any
    // server don't prevent the rest of the registration from being merged.
    let unknown = PrefixSubTlv::Unknown(UnknownTlv::new(
        7,
        true,
        Bytes::from_static(&[0x01, 0x02]),
    ));
    let data = vec![
        prefix(p1, vec![has_route(true, RLOC_A, RoutePreference::High)]),
        prefix(p2, vec![unknown]),
        NetDataTlv::Service(ServiceTlv::new(
            0,
            THREAD_ENTERPRISE_NUMBER,
            Bytes::from_static(&[0x01]),
        )),
    ];
    register(&mut leader, &rt, RLOC_A, data).unwrap();

    let netdata = leader.network_data();
    assert_eq!(netdata.prefixes().count(), 1);
    assert!(netdata.find_prefix(&p1).is_some());
    assert!(netdata.find_prefix(&p2).is_none());
    assert_eq!(netdata.services().count(), 0);
    assert_no_empty_containers(netdata);

    // A prefix without sub-TLVs on its own leaves the Network Data empty.
    let mut leader = self::leader();
    let version = leader.version();
    register(&mut leader, &rt, RLOC_B, vec![prefix(p1, vec![])]).unwrap();
    assert!(leader.network_data().is_empty());
    assert_eq!(leader.version(), version);
}

#[test]
fn test_netdata_full() {
    let rt = router_table();
    let mut leader = leader();
    let data = (0..12)
        .map(|idx| {
            prefix(
                prefix_64(idx),
                vec![border_router(true, RLOC_A, RoutePreference::Medium, DFLT_ROUTE_FLAGS)],
            )
        })
        .collect::<Vec<_>>();
    let data = encode(data);

    // Registration is checked against a scratch copy.
    assert!(!leader.would_fit(&rt, RLOC_A, &data));
    assert!(leader.network_data().is_empty());

    // The prefixes that fit are merged.
    let (v0, sv0) = (leader.version(), leader.stable_version());
    let error = leader.register_network_data(&rt, RLOC_A, &data).unwrap_err();
    assert_eq!(error.kind(), ErrorKind::NoBufs);
    assert_eq!(leader.network_data().prefixes().count(), 11);
    assert!(leader.network_data().find_prefix(&prefix_64(11)).is_none());
    assert!(leader.network_data().len() <= 254);
    assert_eq!(leader.version(), v0.wrapping_add(1));
    assert_eq!(leader.stable_version(), sv0.wrapping_add(1));
    assert_no_empty_containers(leader.network_data());

    // A smaller registration fits.
    let data = encode(vec![prefix(
        prefix_64(0),
        vec![border_router(true, RLOC_B, RoutePreference::Medium, DFLT_ROUTE_FLAGS)],
    )]);
    assert!(leader.would_fit(&rt, RLOC_B, &data));
}

#[test]
fn test_context_ids_exhausted() {
    let rt = router_table();
    let mut leader = leader();
    let data = (0..16)
        .map(|idx| {
            prefix(
                prefix_8(idx),
                vec![border_router(true, RLOC_A, RoutePreference::Medium, DFLT_ROUTE_FLAGS)],
            )
        })
        .collect::<Vec<_>>();

    assert_eq!(register(&mut leader, &rt, RLOC_A, data), Err(ErrorKind::NoBufs));
    let netdata = leader.network_data();
    assert_eq!(netdata.prefixes().count(), 15);
    for context_id in 1..=15 {
        assert!(netdata.find_prefix_by_context_id(context_id).is_some());
    }
    assert!(netdata.find_prefix(&prefix_8(15)).is_none());
    assert_eq!(leader.context_ids().unallocated_id(), None);
}

#[test]
fn test_service_ids() {
    const SERVICE_DATA: [u8; 17] = [
        0x00, 0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08, 0x09, 0x0a,
        0x0b, 0x0c, 0x0d, 0x0e, 0x0f, 0x10,
    ];
    let rt = router_table();
    let mut leader = leader();
    let data = (0..17)
        .map(|idx| service(&SERVICE_DATA[idx..idx + 1], true, RLOC_A))
        .collect::<Vec<_>>();

    assert_eq!(register(&mut leader, &rt, RLOC_A, data), Err(ErrorKind::NoBufs));
    let netdata = leader.network_data();
    assert_eq!(netdata.services().count(), 16);
    for service_id in 0..=15 {
        let service = netdata.find_service_by_id(service_id).unwrap();
        assert_eq!(service.service_data.as_ref(), &[service_id]);
    }

    // Released Service IDs are reused, lowest first.
    leader.remove_border_router(RLOC_A, MatchMode::Rloc16);
    register(&mut leader, &rt, RLOC_B, vec![service(&[0x10], true, RLOC_B)]).unwrap();
    let service = leader.network_data().services().next().unwrap();
    assert_eq!(service.service_id, 0);
}

#[test]
fn test_shared_service() {
    let rt = router_table();
    let mut leader = leader();

    register(&mut leader, &rt, RLOC_B, vec![service(&[0x5c], true, RLOC_B)]).unwrap();
    register(&mut leader, &rt, RLOC_A, vec![service(&[0x5c], false, RLOC_A)]).unwrap();

    let netdata = leader.network_data();
    assert_eq!(netdata.services().count(), 1);
    let service = netdata.services().next().unwrap();
    assert!(service.stable);
    assert_eq!(service.servers().count(), 2);

    // The server with the lowest path cost is reached through its parent.
    assert_eq!(anycast(&leader, &rt, 0xfc10), Ok(0x4000));

    leader.remove_border_router(RLOC_A, MatchMode::RouterId);
    assert_eq!(anycast(&leader, &rt, 0xfc10), Ok(0x5000));
    leader.remove_border_router(0x5000, MatchMode::RouterId);
    assert_eq!(anycast(&leader, &rt, 0xfc10), Err(ErrorKind::NoRoute));
    assert!(leader.network_data().is_empty());
}

#[test]
fn test_route_preference_order_independent() {
    let rt = router_table();
    let p = net6!("2001:db8::/64");
    let source = ip6!("2001:db8::1");
    let destination = ip6!("2600::1");
    let data_a = vec![prefix(
        p,
        vec![border_router(true, RLOC_A, RoutePreference::Low, DFLT_ROUTE_FLAGS)],
    )];
    let data_c = vec![prefix(
        p,
        vec![border_router(true, RLOC_C, RoutePreference::High, DFLT_ROUTE_FLAGS)],
    )];

    let mut leader1 = leader();
    register(&mut leader1, &rt, RLOC_A, data_a.clone()).unwrap();
    register(&mut leader1, &rt, RLOC_C, data_c.clone()).unwrap();

    let mut leader2 = leader();
    register(&mut leader2, &rt, RLOC_C, data_c).unwrap();
    register(&mut leader2, &rt, RLOC_A, data_a).unwrap();

    for _ in 0..8 {
        assert_eq!(route(&leader1, &rt, &source, &destination), Ok(RLOC_C));
        assert_eq!(route(&leader2, &rt, &source, &destination), Ok(RLOC_C));
    }

    // No prefix matches the source.
    let error = leader1
        .route_lookup(&rt, &ip6!("2001:db9::1"), &destination)
        .unwrap_err();
    assert_eq!(error.kind(), ErrorKind::NoRoute);
}

#[test]
fn test_equal_preference_path_cost() {
    let rt = router_table();
    let mut leader = leader();
    let p = net6!("2001:db8::/64");

    register(
        &mut leader,
        &rt,
        RLOC_C,
        vec![prefix(
            p,
            vec![border_router(true, RLOC_C, RoutePreference::Medium, DFLT_ROUTE_FLAGS)],
        )],
    )
    .unwrap();
    register(
        &mut leader,
        &rt,
        RLOC_B,
        vec![prefix(
            p,
            vec![border_router(true, RLOC_B, RoutePreference::Medium, DFLT_ROUTE_FLAGS)],
        )],
    )
    .unwrap();

    let rloc16 = route(&leader, &rt, &ip6!("2001:db8::1"), &ip6!("2600::1"));
    assert_eq!(rloc16, Ok(RLOC_B));
}

#[test]
fn test_external_route_longest_match() {
    let rt = router_table();
    let mut leader = leader();

    register(
        &mut leader,
        &rt,
        RLOC_A,
        vec![prefix(
            net6!("2001:db8::/64"),
            vec![border_router(
                true,
                RLOC_A,
                RoutePreference::Medium,
                BorderRouterFlags::ON_MESH | BorderRouterFlags::SLAAC,
            )],
        )],
    )
    .unwrap();
    register(
        &mut leader,
        &rt,
        RLOC_B,
        vec![prefix(net6!("fd00::/8"), vec![has_route(true, RLOC_B, RoutePreference::High)])],
    )
    .unwrap();
    register(
        &mut leader,
        &rt,
        RLOC_C,
        vec![prefix(
            net6!("fd00:1::/32"),
            vec![has_route(true, RLOC_C, RoutePreference::Low)],
        )],
    )
    .unwrap();

    let source = ip6!("2001:db8::1");
    assert_eq!(
        route(&leader, &rt, &source, &ip6!("fd00:1::1")),
        Ok(RLOC_C)
    );
    assert_eq!(
        route(&leader, &rt, &source, &ip6!("fd00:2::1")),
        Ok(RLOC_B)
    );
    // No default route is advertised.
    assert!(route(&leader, &rt, &source, &ip6!("2600::1")).is_err());
}

#[test]
fn test_anycast_lookup() {
    let mut rt = router_table();
    let mut leader = leader();

    register(
        &mut leader,
        &rt,
        0x4000,
        vec![prefix(
            net6!("2001:db8::/64"),
            vec![border_router(
                true,
                0x4000,
                RoutePreference::Medium,
                BorderRouterFlags::ON_MESH | BorderRouterFlags::DHCP,
            )],
        )],
    )
    .unwrap();

    assert_eq!(anycast(&leader, &rt, 0xfc00), Ok(0x0000));
    assert_eq!(anycast(&leader, &rt, 0xfc01), Ok(0x4000));
    assert_eq!(anycast(&leader, &rt, 0xfc02), Err(ErrorKind::NoRoute));
    assert_eq!(anycast(&leader, &rt, 0xfc10), Err(ErrorKind::NoRoute));
    assert_eq!(anycast(&leader, &rt, 0xfc40), Err(ErrorKind::NoRoute));
    assert_eq!(anycast(&leader, &rt, 0xfc30), Err(ErrorKind::NoRoute));
    assert_eq!(anycast(&leader, &rt, 0xfc38), Err(ErrorKind::Drop));
    assert_eq!(anycast(&leader, &rt, 0xfc50), Err(ErrorKind::Drop));

    // Active commissioner.
    let value = commissioning_tlvs(&[(11, &[0x00, 0x01]), (9, &[0x0c, 0x00])]);
    leader.set_commissioning_data(&value).unwrap();
    assert_eq!(anycast(&leader, &rt, 0xfc30), Ok(0x0c00));

    // Primary Backbone Router.
    rt.backbone_router_primary = Some(0x5000);
    assert_eq!(anycast(&leader, &rt, 0xfc38), Ok(0x5000));

    // A child of this device is reached directly.
    rt.rloc16 = 0x4000;
    register(
        &mut leader,
        &rt,
        0x4002,
        vec![prefix(
            net6!("2001:db8:1::/64"),
            vec![border_router(
                true,
                0x4002,
                RoutePreference::Medium,
                BorderRouterFlags::ON_MESH | BorderRouterFlags::ND_DNS,
            )],
        )],
    )
    .unwrap();
    assert_eq!(anycast(&leader, &rt, 0xfc41), Ok(0x4002));
}

#[test]
fn test_context_lookup() {
    let rt = router_table();
    let mut leader = leader();

    register(
        &mut leader,
        &rt,
        RLOC_A,
        vec![prefix(
            net6!("2001:db8::/64"),
            vec![border_router(
                true,
                RLOC_A,
                RoutePreference::Medium,
                BorderRouterFlags::ON_MESH | BorderRouterFlags::SLAAC,
            )],
        )],
    )
    .unwrap();
    register(
        &mut leader,
        &rt,
        RLOC_B,
        vec![prefix(
            net6!("2001:db8::/32"),
            vec![border_router(true, RLOC_B, RoutePreference::Medium, DFLT_ROUTE_FLAGS)],
        )],
    )
    .unwrap();

    // Mesh-local addresses always map to context 0.
    let context = leader
        .context_by_address(&rt, &ip6!("fdde:ad00:beef::1"))
        .unwrap();
    assert_eq!(context.context_id, 0);
    assert!(context.compress);
    assert_eq!(context.prefix, net6!("fdde:ad00:beef::/64"));
    assert_eq!(leader.context_by_id(&rt, 0), Some(context));

    // The longest prefix wins.
    let context = leader
        .context_by_address(&rt, &ip6!("2001:db8::1"))
        .unwrap();
    assert_eq!(context.context_id, 1);
    let context = leader
        .context_by_address(&rt, &ip6!("2001:db8:ffff::1"))
        .unwrap();
    assert_eq!(context.context_id, 2);
    assert!(leader.context_by_address(&rt, &ip6!("2600::1")).is_none());
    assert!(leader.context_by_id(&rt, 3).is_none());

    assert!(leader.is_on_mesh(&rt, &ip6!("fdde:ad00:beef::1")));
    assert!(leader.is_on_mesh(&rt, &ip6!("2001:db8::1")));
    assert!(leader.is_on_mesh(&rt, &ip6!("2001:db8:1::1")));
    assert!(!leader.is_on_mesh(&rt, &ip6!("2600::1")));
}

#[test]
fn test_commissioning_set() {
    let mut leader = leader();
    assert_eq!(leader.commissioning_get(&[]), None);

    // Session ID missing.
    let data = commissioning_tlvs(&[(8, &[0xff])]);
    assert_eq!(leader.handle_commissioning_set(&data), CommissioningState::Reject);

    // Neither Steering Data nor Joiner UDP Port.
    let data = commissioning_tlvs(&[(11, &[0x12, 0x34])]);
    assert_eq!(leader.handle_commissioning_set(&data), CommissioningState::Reject);

    // Border Agent Locator can't be set by the commissioner.
    let data = commissioning_tlvs(&[(11, &[0x12, 0x34]), (8, &[0xff]), (9, &[0x04, 0x00])]);
    assert_eq!(leader.handle_commissioning_set(&data), CommissioningState::Reject);

    // Malformed TLVs.
    assert_eq!(
        leader.handle_commissioning_set(&[0x0b, 0x04, 0x12]),
        CommissioningState::Reject
    );
    assert_eq!(leader.commissioning_get(&[]), None);

    // Active commissioner petition.
    let value = commissioning_tlvs(&[(11, &[0x12, 0x34]), (9, &[0x04, 0x00])]);
    leader.set_commissioning_data(&value).unwrap();

    // Session ID mismatch.
    let data = commissioning_tlvs(&[(11, &[0x00, 0x01]), (8, &[0xff])]);
    assert_eq!(leader.handle_commissioning_set(&data), CommissioningState::Reject);

    let (v0, sv0) = (leader.version(), leader.stable_version());
    let data = commissioning_tlvs(&[(11, &[0x12, 0x34]), (8, &[0xff]), (18, &[0x03, 0xe8])]);
    assert_eq!(leader.handle_commissioning_set(&data), CommissioningState::Accept);
    assert_eq!(leader.version(), v0.wrapping_add(1));
    assert_eq!(leader.stable_version(), sv0);

    // The Border Agent Locator is carried over.
    let dataset = leader.commissioning_dataset();
    assert_eq!(dataset.session_id, Some(0x1234));
    assert_eq!(dataset.locator, Some(0x0400));
    assert_eq!(dataset.joiner_udp_port, Some(1000));
    assert_eq!(dataset.steering_data, Some(Bytes::from_static(&[0xff])));

    // Requested TLVs are returned in the requested order.
    let value = leader.commissioning_get(&[9, 11]).unwrap();
    assert_eq!(
        value.as_ref(),
        commissioning_tlvs(&[(9, &[0x04, 0x00]), (11, &[0x12, 0x34])])
    );
    let value = leader.commissioning_get(&[]).unwrap();
    assert_eq!(
        value.as_ref(),
        commissioning_tlvs(&[
            (11, &[0x12, 0x34]),
            (8, &[0xff]),
            (18, &[0x03, 0xe8]),
            (9, &[0x04, 0x00]),
        ])
    );
}

#[test]
fn test_commissioning_data_too_large() {
    let mut leader = leader();
    leader.set_commissioning_data(&[0x0b, 0x02, 0x00, 0x01]).unwrap();
    let (v0, sv0) = (leader.version(), leader.stable_version());

    let error = leader.set_commissioning_data(&[0; 252]).unwrap_err();
    assert_eq!(error.kind(), ErrorKind::NoBufs);
    assert_eq!(
        leader.commissioning_get(&[]).unwrap().as_ref(),
        &[0x0b, 0x02, 0x00, 0x01]
    );
    assert_eq!((leader.version(), leader.stable_version()), (v0, sv0));

    // An empty value removes the Commissioning Data.
    leader.set_commissioning_data(&[]).unwrap();
    assert_eq!(leader.commissioning_get(&[]), None);
    assert!(leader.network_data().is_empty());
}

#[test]
fn test_stable_network_data() {
    let rt = router_table();
    let mut leader = leader();

    register(
        &mut leader,
        &rt,
        RLOC_A,
        vec![
            prefix(
                net6!("2001:db8::/64"),
                vec![
                    border_router(
                        true,
                        RLOC_A,
                        RoutePreference::Medium,
                        BorderRouterFlags::ON_MESH | BorderRouterFlags::DHCP,
                    ),
                    has_route(false, RLOC_A, RoutePreference::Medium),
                ],
            ),
            prefix(net6!("fd00::/8"), vec![has_route(false, RLOC_A, RoutePreference::Medium)]),
            service(&[0x01], true, RLOC_A),
        ],
    )
    .unwrap();

    let stable = leader.stable_network_data();
    assert_eq!(stable.tlvs.len(), 2);
    let prefix_tlv = stable.prefixes().next().unwrap();
    assert!(prefix_tlv.has_route(false).is_none());
    assert_eq!(prefix_tlv.border_router(true).unwrap().entries[0].rloc16, 0xfc01);
    let service = stable.services().next().unwrap();
    assert_eq!(service.servers().next().unwrap().rloc16, 0xfc10);
}

#[tokio::test(start_paused = true)]
async fn test_restore_network_data() {
    let rt = router_table();
    let mut leader = leader();

    let data = encode(vec![
        NetDataTlv::Prefix(PrefixTlv {
            stable: true,
            domain_id: 0,
            prefix: net6!("2001:db8::/64"),
            sub_tlvs: vec![
                PrefixSubTlv::BorderRouter(BorderRouterTlv {
                    stable: true,
                    entries: vec![
                        BorderRouterEntry::new(
                            0x4000,
                            RoutePreference::Medium,
                            DFLT_ROUTE_FLAGS,
                        ),
                        BorderRouterEntry::new(
                            0x8001,
                            RoutePreference::Medium,
                            DFLT_ROUTE_FLAGS,
                        ),
                    ],
                }),
                PrefixSubTlv::Context(ContextTlv::new(true, true, 3, 64)),
            ],
        }),
        NetDataTlv::Prefix(PrefixTlv {
            stable: true,
            domain_id: 0,
            prefix: net6!("2001:db8:1::/64"),
            sub_tlvs: vec![
                has_route(false, 0x4000, RoutePreference::Medium),
                PrefixSubTlv::Context(ContextTlv::new(true, false, 5, 64)),
            ],
        }),
        NetDataTlv::CommissioningData(CommissioningDataTlv::new(
            false,
            Bytes::from(commissioning_tlvs(&[(11, &[0x00, 0x07]), (9, &[0x04, 0x00])])),
        )),
    ]);

    leader.restore_network_data(&rt, 10, 20, &data).unwrap();

    // Entries from the unallocated router ID are gone.
    let netdata = leader.network_data();
    let prefix_tlv = netdata.find_prefix(&net6!("2001:db8::/64")).unwrap();
    let entries = &prefix_tlv.border_router(true).unwrap().entries;
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].rloc16, 0x4000);

    // Stable change, then the commissioner is resigned.
    assert_eq!(leader.version(), 12);
    assert_eq!(leader.stable_version(), 21);

    assert_eq!(leader.context_ids().state(3), Some(ContextIdState::InUse));
    assert!(matches!(
        leader.context_ids().state(5),
        Some(ContextIdState::PendingRemoval(_))
    ));
    assert_eq!(leader.context_ids().unallocated_id(), Some(1));

    let dataset = leader.commissioning_dataset();
    assert_eq!(dataset.session_id, Some(8));
    assert_eq!(dataset.locator, None);

    // Malformed data is rejected.
    let error = leader
        .restore_network_data(&rt, 0, 0, &[0x03, 0x10])
        .unwrap_err();
    assert_eq!(error.kind(), ErrorKind::Parse);
}

#[test]
fn test_reset() {
    let rt = router_table();
    let mut leader = leader();
    register(
        &mut leader,
        &rt,
        RLOC_A,
        vec![prefix(
            net6!("2001:db8::/64"),
            vec![border_router(true, RLOC_A, RoutePreference::Medium, DFLT_ROUTE_FLAGS)],
        )],
    )
    .unwrap();

    leader.reset();
    assert!(leader.network_data().is_empty());
    assert_eq!(leader.context_ids().unallocated_id(), Some(1));
    assert_eq!(leader.context_ids().state(1), Some(ContextIdState::Unallocated));
}

#[tokio::test(start_paused = true)]
async fn test_instance_context_reuse_timer() {
    let (output_tx, mut output_rx) = mpsc::unbounded_channel();
    let config = LeaderCfg {
        context_id_reuse_delay: 60,
    };
    let (instance, tx, rx) = Instance::new(config, router_table(), output_tx);
    let instance = tokio::spawn(instance.run(rx));

    let data = encode(vec![prefix(
        net6!("2001:db8::/64"),
        vec![border_router(true, RLOC_A, RoutePreference::Medium, DFLT_ROUTE_FLAGS)],
    )]);
    tx.requests
        .send(ProtocolInputMsg::ServerData(ServerDataMsg {
            rloc16: RLOC_A,
            data: Bytes::from(data),
        }))
        .unwrap();
    tx.requests
        .send(ProtocolInputMsg::RemoveBorderRouter(RemoveBorderRouterMsg {
            rloc16: RLOC_A,
            mode: MatchMode::Rloc16,
        }))
        .unwrap();

    // Wait for the context to be released.
    let mut registered = false;
    loop {
        match output_rx.recv().await.unwrap() {
            ProtocolOutputMsg::ServerDataResponse(msg) => {
                assert_eq!(msg.rloc16, RLOC_A);
                assert_eq!(msg.error, None);
                registered = true;
            }
            ProtocolOutputMsg::NetDataChanged(msg) => {
                if msg.data.is_empty() {
                    break;
                }
            }
            _ => (),
        }
    }
    assert!(registered);

    tx.requests
        .send(ProtocolInputMsg::CommissioningGet(CommissioningGetMsg {
            tlv_types: vec![],
        }))
        .unwrap();
    match output_rx.recv().await.unwrap() {
        ProtocolOutputMsg::CommissioningGetResponse(msg) => {
            assert_eq!(msg.data, None);
        }
        msg => panic!("unexpected message: {msg:?}"),
    }

    drop(tx);
    let leader = instance.await.unwrap();
    assert!(leader.network_data().is_empty());
    assert_eq!(leader.context_ids().state(1), Some(ContextIdState::Unallocated));
}

#[tokio::test]
async fn test_instance_output_order() {
    let (output_tx, mut output_rx) = mpsc::unbounded_channel();
    let (instance, tx, rx) =
        Instance::new(LeaderCfg::default(), router_table(), output_tx);
    let instance = tokio::spawn(instance.run(rx));

    for rloc16 in [RLOC_A, RLOC_B] {
        let data = encode(vec![prefix(
            net6!("2001:db8::/64"),
            vec![has_route(true, rloc16, RoutePreference::Medium)],
        )]);
        tx.requests
            .send(ProtocolInputMsg::ServerData(ServerDataMsg {
                rloc16,
                data: Bytes::from(data),
            }))
            .unwrap();
    }
    drop(tx);
    let leader = instance.await.unwrap();

    // Each response is followed by the change notification it caused.
    let mut outputs = vec![];
    while let Some(msg) = output_rx.recv().await {
        outputs.push(msg);
    }
    assert_eq!(outputs.len(), 4);
    for (idx, rloc16) in [RLOC_A, RLOC_B].into_iter().enumerate() {
        match &outputs[idx * 2] {
            ProtocolOutputMsg::ServerDataResponse(msg) => {
                assert_eq!(msg.rloc16, rloc16);
                assert_eq!(msg.error, None);
            }
            msg => panic!("unexpected message: {msg:?}"),
        }
        assert!(matches!(
            &outputs[idx * 2 + 1],
            ProtocolOutputMsg::NetDataChanged(_)
        ));
    }
    match &outputs[3] {
        ProtocolOutputMsg::NetDataChanged(msg) => {
            assert_eq!(msg.version, leader.version());
            assert_eq!(msg.data, leader.network_data().encode().freeze());
        }
        msg => panic!("unexpected message: {msg:?}"),
    }
}

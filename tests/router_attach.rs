//! End-to-end attach conformance: a candidate router joins a leader's
//! network and the captured traffic must follow the normative sequence.

use mlecert::{
    CommandType, Device, DeviceId, HarnessConfig, Medium, MessageAssertions, Role, ScanMaskTlv,
    Sniffer, TlvRequestTlv, TlvType,
};
use std::sync::Arc;
use std::time::Duration;

const LEADER: u32 = 1;
const ROUTER: u32 = 2;

fn init_logging() {
    use tracing_subscriber::EnvFilter;
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

struct Fixture {
    leader: Device,
    router: Device,
    sniffer: Sniffer,
    config: HarnessConfig,
}

impl Fixture {
    fn new() -> Self {
        init_logging();
        let mut config = HarnessConfig::default();
        config.router_selection_jitter_ms = 1_000;

        let medium = Arc::new(Medium::new(config.channel_buffer));
        let leader = Device::new(DeviceId::new(LEADER), Arc::clone(&medium), &config);
        let router = Device::new(DeviceId::new(ROUTER), Arc::clone(&medium), &config);

        leader.set_panid(0xface);
        leader.set_mode("rsdn");
        leader.add_whitelist(router.ext_addr());
        leader.enable_whitelist();

        router.set_panid(0xface);
        router.set_mode("rsdn");
        router.add_whitelist(leader.ext_addr());
        router.enable_whitelist();
        router.set_router_selection_jitter(Duration::from_secs(1));

        let mut sniffer = Sniffer::new(medium, &config);
        sniffer.start().expect("sniffer failed to start");

        Self {
            leader,
            router,
            sniffer,
            config,
        }
    }

    fn teardown(mut self) {
        self.sniffer.stop();
        self.leader.stop();
        self.router.stop();
    }
}

#[tokio::test]
async fn test_router_attach() {
    let mut fx = Fixture::new();

    fx.leader.start().expect("leader failed to start");
    fx.leader.become_leader().await.expect("leader not running");
    assert!(
        fx.leader
            .wait_for_state(Role::Leader, fx.config.settle_timeout())
            .await,
        "leader state: {}",
        fx.leader.get_state()
    );

    fx.router.start().expect("router failed to start");
    assert!(
        fx.router
            .wait_for_state(Role::Router, fx.config.settle_timeout())
            .await,
        "router state: {}",
        fx.router.get_state()
    );

    let mut leader_messages = fx
        .sniffer
        .messages_sent_by(DeviceId::new(LEADER))
        .expect("sniffer not capturing");
    let mut router_messages = fx
        .sniffer
        .messages_sent_by(DeviceId::new(ROUTER))
        .expect("sniffer not capturing");

    // 1 - Leader advertises its network.
    let msg = leader_messages
        .next_mle_message(CommandType::Advertisement)
        .await
        .unwrap();
    msg.assert_sent_with_hop_limit(255).unwrap();
    msg.assert_sent_to_destination("ff02::1".parse().unwrap())
        .unwrap();
    msg.assert_contains_tlv(TlvType::SourceAddress).unwrap();
    msg.assert_contains_tlv(TlvType::LeaderData).unwrap();
    msg.assert_contains_tlv(TlvType::Route64).unwrap();

    // 2 - Router solicits a parent among routers only.
    let msg = router_messages
        .next_mle_message(CommandType::ParentRequest)
        .await
        .unwrap();
    msg.assert_sent_with_hop_limit(255).unwrap();
    msg.assert_sent_to_destination("ff02::2".parse().unwrap())
        .unwrap();
    msg.assert_contains_tlv(TlvType::Mode).unwrap();
    msg.assert_contains_tlv(TlvType::Challenge).unwrap();
    msg.assert_contains_tlv(TlvType::ScanMask).unwrap();
    msg.assert_contains_tlv(TlvType::Version).unwrap();

    let scan_mask: ScanMaskTlv = msg
        .get_tlv_as()
        .unwrap()
        .expect("scan mask presence already asserted");
    assert!(scan_mask.router);
    assert!(!scan_mask.end_device);

    // 3 - Leader offers itself as parent.
    let msg = leader_messages
        .next_mle_message(CommandType::ParentResponse)
        .await
        .unwrap();
    msg.assert_sent_to_device(&fx.router).unwrap();
    msg.assert_contains_tlv(TlvType::SourceAddress).unwrap();
    msg.assert_contains_tlv(TlvType::LeaderData).unwrap();
    msg.assert_contains_tlv(TlvType::LinkLayerFrameCounter)
        .unwrap();
    msg.assert_contains_optional_tlv(TlvType::MleFrameCounter)
        .unwrap();
    msg.assert_contains_tlv(TlvType::Response).unwrap();
    msg.assert_contains_tlv(TlvType::Challenge).unwrap();
    msg.assert_contains_tlv(TlvType::LinkMargin).unwrap();
    msg.assert_contains_tlv(TlvType::Connectivity).unwrap();
    msg.assert_contains_tlv(TlvType::Version).unwrap();

    // 4 - Router requests a child id; router-capable devices do not
    //     register addresses.
    let msg = router_messages
        .next_mle_message(CommandType::ChildIdRequest)
        .await
        .unwrap();
    msg.assert_sent_to_device(&fx.leader).unwrap();
    msg.assert_contains_tlv(TlvType::Response).unwrap();
    msg.assert_contains_tlv(TlvType::LinkLayerFrameCounter)
        .unwrap();
    msg.assert_contains_optional_tlv(TlvType::MleFrameCounter)
        .unwrap();
    msg.assert_contains_tlv(TlvType::Mode).unwrap();
    msg.assert_contains_tlv(TlvType::Timeout).unwrap();
    msg.assert_contains_tlv(TlvType::Version).unwrap();
    msg.assert_contains_tlv(TlvType::TlvRequest).unwrap();
    msg.assert_does_not_contain_tlv(TlvType::AddressRegistration)
        .unwrap();

    // 5 - Leader admits the child.
    let msg = leader_messages
        .next_mle_message(CommandType::ChildIdResponse)
        .await
        .unwrap();
    msg.assert_sent_to_device(&fx.router).unwrap();
    msg.assert_contains_tlv(TlvType::SourceAddress).unwrap();
    msg.assert_contains_tlv(TlvType::LeaderData).unwrap();
    msg.assert_contains_tlv(TlvType::Address16).unwrap();
    msg.assert_contains_optional_tlv(TlvType::NetworkData)
        .unwrap();
    msg.assert_contains_optional_tlv(TlvType::Route64).unwrap();
    msg.assert_contains_optional_tlv(TlvType::AddressRegistration)
        .unwrap();

    // 8 - Router opens the link exchange for promotion, asking for the
    //     peer's link margin.
    let msg = router_messages
        .next_mle_message(CommandType::LinkRequest)
        .await
        .unwrap();
    msg.assert_contains_tlv(TlvType::SourceAddress).unwrap();
    msg.assert_contains_tlv(TlvType::LeaderData).unwrap();
    msg.assert_contains_tlv(TlvType::Challenge).unwrap();
    msg.assert_contains_tlv(TlvType::Version).unwrap();
    msg.assert_contains_tlv(TlvType::TlvRequest).unwrap();

    let tlv_request: TlvRequestTlv = msg
        .get_tlv_as()
        .unwrap()
        .expect("tlv request presence already asserted");
    assert!(tlv_request.contains(TlvType::LinkMargin));

    // 9 - Leader accepts and requests back.
    let msg = leader_messages
        .next_mle_message(CommandType::LinkAcceptAndRequest)
        .await
        .unwrap();
    msg.assert_contains_tlv(TlvType::SourceAddress).unwrap();
    msg.assert_contains_tlv(TlvType::LeaderData).unwrap();
    msg.assert_contains_tlv(TlvType::Response).unwrap();
    msg.assert_contains_tlv(TlvType::LinkLayerFrameCounter)
        .unwrap();
    msg.assert_contains_tlv(TlvType::Version).unwrap();
    msg.assert_contains_tlv(TlvType::LinkMargin).unwrap();
    msg.assert_contains_optional_tlv(TlvType::MleFrameCounter)
        .unwrap();
    msg.assert_contains_optional_tlv(TlvType::Challenge)
        .unwrap();

    // 10 - Promoted router advertises.
    let msg = router_messages
        .next_mle_message(CommandType::Advertisement)
        .await
        .unwrap();
    msg.assert_sent_with_hop_limit(255).unwrap();
    msg.assert_sent_to_destination("ff02::1".parse().unwrap())
        .unwrap();
    msg.assert_contains_tlv(TlvType::SourceAddress).unwrap();
    msg.assert_contains_tlv(TlvType::LeaderData).unwrap();
    msg.assert_contains_tlv(TlvType::Route64).unwrap();

    // 11 - Every leader address answers the router's probes.
    for addr in fx.leader.addresses() {
        assert!(fx.router.ping(addr).await, "no reply from {}", addr);
    }

    fx.teardown();
}

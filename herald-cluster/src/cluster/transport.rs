use anyhow::{Context, Result};
use async_trait::async_trait;
use herald_core::{AdvertiseConfig, ProxyEndpoint};
use std::net::{Ipv4Addr, SocketAddrV4};
use tokio::net::UdpSocket;
use tracing::{debug, warn};

/// 通告传输接口
///
/// 发送失败是非致命的，由广播器记录并在下一个周期重试。
#[async_trait]
pub trait AdvertiseTransport: Send + Sync {
    /// 本传输是否具备组播能力
    fn multicast_available(&self) -> bool;

    /// 向组播组发送一条通告
    async fn broadcast(&self, payload: &[u8]) -> Result<()>;

    /// 向单个静态代理端点发送一条通告
    async fn send_to(&self, endpoint: &ProxyEndpoint, payload: &[u8]) -> Result<()>;
}

/// 基于 UDP 的通告传输
///
/// 绑定一个匿名 UDP 套接字；组播能力通过加入配置的组来探测，
/// 加入失败只降级为仅静态代理发送，不算错误。
pub struct UdpTransport {
    socket: UdpSocket,
    group: SocketAddrV4,
    multicast_ok: bool,
}

impl UdpTransport {
    pub async fn bind(advertise: &AdvertiseConfig) -> Result<Self> {
        let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0))
            .await
            .context("failed to bind advertisement socket")?;

        let group: Ipv4Addr = advertise
            .group
            .parse()
            .with_context(|| format!("invalid advertise group '{}'", advertise.group))?;
        let interface: Ipv4Addr = match &advertise.interface {
            Some(interface) => interface
                .parse()
                .with_context(|| format!("invalid advertise interface '{interface}'"))?,
            None => Ipv4Addr::UNSPECIFIED,
        };

        // 加入组播组同时充当组播可用性探测
        let multicast_ok = match socket.join_multicast_v4(group, interface) {
            Ok(()) => {
                if let Err(e) = socket.set_multicast_ttl_v4(advertise.ttl) {
                    debug!("Failed to set multicast TTL: {}", e);
                }
                true
            }
            Err(e) => {
                warn!("No multicast-capable interface available: {}", e);
                false
            }
        };

        Ok(Self {
            socket,
            group: SocketAddrV4::new(group, advertise.port),
            multicast_ok,
        })
    }
}

#[async_trait]
impl AdvertiseTransport for UdpTransport {
    fn multicast_available(&self) -> bool {
        self.multicast_ok
    }

    async fn broadcast(&self, payload: &[u8]) -> Result<()> {
        self.socket
            .send_to(payload, self.group)
            .await
            .with_context(|| format!("multicast send to {} failed", self.group))?;
        Ok(())
    }

    async fn send_to(&self, endpoint: &ProxyEndpoint, payload: &[u8]) -> Result<()> {
        self.socket
            .send_to(payload, (endpoint.host.as_str(), endpoint.port))
            .await
            .with_context(|| format!("datagram send to {endpoint} failed"))?;
        Ok(())
    }
}

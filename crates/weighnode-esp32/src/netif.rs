//! Static addressing on the station interface.
//!
//! `esp-idf-svc` only takes fixed settings when the interface is created;
//! switching a running station from DHCP to a static address goes through
//! the `esp_netif` C API.

use esp_idf_svc::sys::{
    esp, esp_ip4_addr_t, esp_netif_dhcpc_stop, esp_netif_dns_info_t,
    esp_netif_dns_type_t_ESP_NETIF_DNS_BACKUP, esp_netif_dns_type_t_ESP_NETIF_DNS_MAIN,
    esp_netif_ip_info_t, esp_netif_set_dns_info, esp_netif_set_ip_info, EspError,
    ESP_ERR_ESP_NETIF_DHCP_ALREADY_STOPPED, ESP_IPADDR_TYPE_V4,
};
use std::net::Ipv4Addr;
use std::sync::PoisonError;
use weighnode_core::connection::DnsSlot;
use weighnode_core::{DriverError, IpInfo, NetifControl};

use crate::wifi::SharedWifi;

/// [`NetifControl`] over the station interface of the shared driver.
pub struct StaNetif {
    wifi: SharedWifi,
}

impl StaNetif {
    pub fn new(wifi: SharedWifi) -> Self {
        Self { wifi }
    }

    fn call(
        &self,
        operation: &'static str,
        f: impl FnOnce(*mut esp_idf_svc::sys::esp_netif_t) -> Result<(), EspError>,
    ) -> Result<(), DriverError> {
        let wifi = self.wifi.lock().unwrap_or_else(PoisonError::into_inner);
        f(wifi.sta_netif().handle()).map_err(|e| DriverError::new(operation, e))
    }
}

fn ip4(addr: Ipv4Addr) -> esp_ip4_addr_t {
    // lwIP keeps addresses in network byte order.
    esp_ip4_addr_t {
        addr: u32::from_ne_bytes(addr.octets()),
    }
}

impl NetifControl for StaNetif {
    fn stop_dhcp_client(&mut self) -> Result<(), DriverError> {
        self.call("esp_netif_dhcpc_stop", |handle| {
            match unsafe { esp_netif_dhcpc_stop(handle) } {
                code if code == ESP_ERR_ESP_NETIF_DHCP_ALREADY_STOPPED as i32 => Ok(()),
                code => esp!(code),
            }
        })
    }

    fn set_ip_info(&mut self, info: &IpInfo) -> Result<(), DriverError> {
        let ip_info = esp_netif_ip_info_t {
            ip: ip4(info.ip),
            netmask: ip4(info.netmask),
            gw: ip4(info.gateway),
        };
        self.call("esp_netif_set_ip_info", |handle| {
            esp!(unsafe { esp_netif_set_ip_info(handle, &ip_info) })
        })
    }

    fn set_dns_server(&mut self, slot: DnsSlot, addr: Ipv4Addr) -> Result<(), DriverError> {
        let mut dns = esp_netif_dns_info_t::default();
        dns.ip.u_addr.ip4 = ip4(addr);
        dns.ip.type_ = ESP_IPADDR_TYPE_V4 as u8;

        let dns_type = match slot {
            DnsSlot::Main => esp_netif_dns_type_t_ESP_NETIF_DNS_MAIN,
            DnsSlot::Backup => esp_netif_dns_type_t_ESP_NETIF_DNS_BACKUP,
        };

        self.call("esp_netif_set_dns_info", |handle| {
            esp!(unsafe { esp_netif_set_dns_info(handle, dns_type, &mut dns) })
        })
    }
}

use pretty_assertions::assert_eq;

use super::*;

#[test]
pub fn test_parse_virtual_server() {
    let vs = r"
apiVersion: k8s.nginx.org/v1
kind: VirtualServer
metadata:
  name: cafe
  namespace: default
spec:
  host: cafe.example.com
  upstreams:
  - name: tea
    service: tea-svc
    port: 80
    type: grpc
    backup: tea-backup
    backupPort: 8080
    healthCheck:
      enable: true
      statusMatch: '! 500'
  - name: coffee
    service: coffee-svc
    subselector:
      version: v1
    port: 80
  routes:
  - path: /tea
    action:
      proxy:
        upstream: tea
        rewritePath: /
  - path: /coffee
    route: coffee
    errorPages: []
  - path: /
    matches:
    - conditions:
      - header: x-version
        value: v2
      action:
        pass: coffee
    action:
      return:
        code: 200
        type: text/plain
        body: ok
";
    let vs: VirtualServer = serde_yaml::from_str(vs).unwrap();
    let ex = VirtualServerEx::new(vs);
    assert_eq!("VirtualServer default/cafe", ex.key().to_string());
    assert_eq!(80, ex.http_port);
    assert_eq!(443, ex.https_port);

    let spec = &ex.virtual_server.spec;
    assert!(spec.upstreams[0].is_grpc());
    assert_eq!(Some(8080), spec.upstreams[0].backup_port);
    assert_eq!("! 500", spec.upstreams[0].health_check.as_ref().unwrap().status_match);
    assert!(!spec.upstreams[1].is_grpc());
    assert_eq!(Some(&"v1".to_owned()), spec.upstreams[1].subselector.get("version"));

    assert_eq!("tea", spec.routes[0].action.as_ref().unwrap().upstream());
    assert_eq!(Some(vec![]), spec.routes[1].error_pages);
    assert_eq!(None, spec.routes[0].error_pages);
    let ret = spec.routes[2].action.as_ref().and_then(|a| a.return_.as_ref()).unwrap();
    assert_eq!("text/plain", ret.return_type);
    assert_eq!("x-version", spec.routes[2].matches[0].conditions[0].header);
}

#[test]
pub fn test_parse_transport_server() {
    let ts = r"
apiVersion: k8s.nginx.org/v1
kind: TransportServer
metadata:
  name: secure-app
spec:
  host: app.example.com
  listener:
    name: tls-passthrough
    protocol: TLS_PASSTHROUGH
  upstreams:
  - name: app
    service: app-svc
    port: 8443
    healthCheck:
      enable: true
      match:
        send: 'GET / HTTP/1.0\r\n'
        expect: '~ 200 OK'
  action:
    pass: app
";
    let ts: TransportServer = serde_yaml::from_str(ts).unwrap();
    let ex = TransportServerEx::new(ts, 0);
    assert_eq!("default", ex.namespace());
    assert_eq!("secure-app", ex.name());
    assert!(ex.transport_server.spec.is_tls_passthrough());
    let health_check = ex.transport_server.spec.upstreams[0].health_check.as_ref().unwrap();
    assert!(health_check.enabled);
    assert_eq!("~ 200 OK", health_check.match_.as_ref().unwrap().expect);
}

#[test]
pub fn test_parse_policies() {
    let policy = r"
apiVersion: k8s.nginx.org/v1
kind: Policy
metadata:
  name: rate-limit
  namespace: cafe
spec:
  rateLimit:
    rate: 10r/s
    key: ${binary_remote_addr}
    zoneSize: 10M
    dryRun: true
";
    let policy: Policy = serde_yaml::from_str(policy).unwrap();
    assert_eq!("Policy cafe/rate-limit", ResourceKey::from(&policy).to_string());
    let rate_limit = policy.spec.rate_limit.unwrap();
    assert_eq!("10r/s", rate_limit.rate);
    assert_eq!(Some(true), rate_limit.dry_run);
    assert!(policy.spec.jwt_auth.is_none());

    let policy = r"
apiVersion: k8s.nginx.org/v1
kind: Policy
metadata:
  name: mtls
spec:
  ingressMTLS:
    clientCertSecret: ca
  egressMTLS:
    tlsSecret: client
";
    let policy: Policy = serde_yaml::from_str(policy).unwrap();
    assert!(policy.spec.ingress_mtls.is_some());
    assert!(policy.spec.egress_mtls.is_some());
}

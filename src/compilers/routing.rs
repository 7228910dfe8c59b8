//! Splits and matches of a route compiled into split_clients blocks, maps and internal locations.
//!
//! A route with splits or matches is served by an internal redirect from its own path to a variable.
//! The variable is resolved per request by a `split_clients` block (random, weighted) or by a chain of maps
//! (conditions) into the path of one of the generated internal locations.

use std::collections::BTreeMap;

use super::{
    locations::{generate_location, GeneratedLocation, LocationScope},
    naming::{UpstreamNamer, VariableNamer, INTERNAL_LOCATION_PREFIX},
    CompileContext,
};
use crate::{
    common::generate_proxy_ssl_name,
    nginx::version2::{Distribution, InternalRedirectLocation, KeyVal, KeyValZone, Location, Map, Parameter, ReturnLocation, SplitClient, TwoWaySplitClients},
    resources::{Action, Condition, Route, Split, Upstream},
};

const KEYVAL_ZONE_BASE_PATH: &str = "/etc/nginx/state_files";
const SPLIT_CLIENTS_KEYVAL_ZONE_SIZE: &str = "100k";
/// Number of split_clients blocks generated for a two-way split whose weights can change without a reload.
pub const SPLIT_CLIENT_AMOUNT_WHEN_WEIGHT_CHANGES_DYNAMIC_RELOAD: usize = 101;

const SPECIAL_MAP_PARAMETERS: [&str; 4] = ["default", "hostnames", "include", "volatile"];

#[derive(Clone, Debug, Default, PartialEq)]
pub struct RoutingConfig {
    pub maps: Vec<Map>,
    pub split_clients: Vec<SplitClient>,
    pub locations: Vec<Location>,
    pub internal_redirect_location: InternalRedirectLocation,
    pub return_locations: Vec<ReturnLocation>,
    pub key_val_zones: Vec<KeyValZone>,
    pub key_vals: Vec<KeyVal>,
    pub two_way_split_clients: Vec<TwoWaySplitClients>,
}

impl RoutingConfig {
    fn append(&mut self, other: RoutingConfig) {
        self.maps.extend(other.maps);
        self.split_clients.extend(other.split_clients);
        self.locations.extend(other.locations);
        self.return_locations.extend(other.return_locations);
        self.key_val_zones.extend(other.key_val_zones);
        self.key_vals.extend(other.key_vals);
        self.two_way_split_clients.extend(other.two_way_split_clients);
    }

    fn push_location(&mut self, generated: GeneratedLocation) {
        self.locations.push(generated.location);
        self.return_locations.extend(generated.return_location);
    }
}

/// Compiles the routes of one resource: the VirtualServer itself or one of its VirtualServerRoutes.
pub struct RouteCompiler<'a> {
    pub upstream_namer: &'a UpstreamNamer,
    pub upstreams: &'a BTreeMap<String, Upstream>,
    pub variable_namer: &'a VariableNamer,
    pub dynamic_weight_changes: bool,
}

fn split_location_path(split_client_index: usize, index: usize) -> String {
    format!("/{INTERNAL_LOCATION_PREFIX}splits_{split_client_index}_split_{index}")
}

fn match_location_path(matches_index: usize, index: usize) -> String {
    format!("/{INTERNAL_LOCATION_PREFIX}matches_{matches_index}_match_{index}")
}

fn matches_default_location_path(matches_index: usize) -> String {
    format!("/{INTERNAL_LOCATION_PREFIX}matches_{matches_index}_default")
}

impl RouteCompiler<'_> {
    fn is_two_way_dynamic(&self, splits: &[Split]) -> bool {
        self.dynamic_weight_changes && splits.len() == 2
    }

    /// Location of a single action, proxying to the upstream the action names.
    pub fn generate_action_location(
        &self,
        path: &str,
        action: Option<&Action>,
        scope: &LocationScope,
        internal: bool,
        original_path: &str,
        ctx: &mut CompileContext,
    ) -> GeneratedLocation {
        let upstream_name = self.upstream_namer.upstream_name_from_action(action);
        let upstream = self.upstreams.get(&upstream_name).cloned().unwrap_or_default();
        let proxy_ssl_name = generate_proxy_ssl_name(&upstream.service, self.upstream_namer.namespace());
        let default_action = Action::default();
        let action = action.unwrap_or(&default_action);
        generate_location(path, &upstream_name, &upstream, action, scope, internal, &proxy_ssl_name, original_path, ctx)
    }

    /// Split clients and internal locations of a list of splits. Consumes split client indices from the context.
    pub fn generate_splits(&self, splits: &[Split], scope: &LocationScope, original_path: &str, ctx: &mut CompileContext) -> RoutingConfig {
        let sc_index = ctx.split_client_index;
        let mut cfg = RoutingConfig::default();

        if self.is_two_way_dynamic(splits) {
            let (split_clients, weights_map) = self.generate_splits_for_weight_changes_dynamic_reload(splits, sc_index);
            let zone_name = self.variable_namer.keyval_zone_for_split_clients(sc_index);
            let key = self.variable_namer.keyval_key_for_split_clients(sc_index);
            let variable = self.variable_namer.keyval_for_split_clients(sc_index);
            cfg.key_val_zones.push(KeyValZone {
                name: zone_name.clone(),
                size: SPLIT_CLIENTS_KEYVAL_ZONE_SIZE.to_owned(),
                state: format!("{KEYVAL_ZONE_BASE_PATH}/{zone_name}.json"),
            });
            cfg.key_vals.push(KeyVal { key: key.clone(), variable: variable.clone(), zone_name: zone_name.clone() });
            cfg.two_way_split_clients.push(TwoWaySplitClients {
                key,
                variable,
                zone_name,
                weights: vec![splits[0].weight, splits[1].weight],
                split_client_index: sc_index,
            });
            cfg.split_clients = split_clients;
            cfg.maps.push(weights_map);
        } else {
            let distributions = splits
                .iter()
                .enumerate()
                .filter(|(_, split)| split.weight != 0)
                .map(|(i, split)| Distribution { weight: format!("{}%", split.weight), value: split_location_path(sc_index, i) })
                .collect();
            cfg.split_clients.push(SplitClient {
                source: "$request_id".to_owned(),
                variable: self.variable_namer.split_client_variable(sc_index),
                distributions,
            });
        }
        ctx.split_client_index += cfg.split_clients.len();

        for (i, split) in splits.iter().enumerate() {
            let generated = self.generate_action_location(&split_location_path(sc_index, i), split.action.as_ref(), scope, true, original_path, ctx);
            cfg.push_location(generated);
        }
        cfg
    }

    /// One split_clients block per possible weight pair in 1% steps, selected through a map over a key-value entry.
    /// Changing the weights then only updates the key-value entry.
    fn generate_splits_for_weight_changes_dynamic_reload(&self, splits: &[Split], sc_index: usize) -> (Vec<SplitClient>, Map) {
        let namer = self.variable_namer;
        let mut split_clients = Vec::with_capacity(SPLIT_CLIENT_AMOUNT_WHEN_WEIGHT_CHANGES_DYNAMIC_RELOAD);
        let mut parameters = Vec::with_capacity(SPLIT_CLIENT_AMOUNT_WHEN_WEIGHT_CHANGES_DYNAMIC_RELOAD + 1);

        for i in 0..=100 {
            let j = 100 - i;
            let mut distributions = vec![];
            if i > 0 {
                distributions.push(Distribution { weight: format!("{i}%"), value: split_location_path(sc_index, 0) });
            }
            if j > 0 {
                distributions.push(Distribution { weight: format!("{j}%"), value: split_location_path(sc_index, 1) });
            }
            split_clients.push(SplitClient {
                source: "$request_id".to_owned(),
                variable: namer.split_clients_for_weights(sc_index, i, j),
                distributions,
            });
            parameters.push(Parameter { value: namer.map_key_for_weights(sc_index, i, j), result: namer.split_clients_for_weights(sc_index, i, j) });
        }

        let default_result = if splits[0].weight < splits[1].weight {
            namer.split_clients_for_weights(sc_index, 0, 100)
        } else {
            namer.split_clients_for_weights(sc_index, 100, 0)
        };
        parameters.push(Parameter { value: "default".to_owned(), result: default_result });

        let map = Map {
            source: namer.keyval_for_split_clients(sc_index),
            variable: namer.map_for_split_clients(sc_index),
            parameters,
        };
        (split_clients, map)
    }

    pub fn generate_default_splits_config(&self, route: &Route, scope: &LocationScope, ctx: &mut CompileContext) -> RoutingConfig {
        let sc_index = ctx.split_client_index;
        let mut cfg = self.generate_splits(&route.splits, scope, &route.path, ctx);
        let destination = if self.is_two_way_dynamic(&route.splits) {
            self.variable_namer.map_for_split_clients(sc_index)
        } else {
            self.variable_namer.split_client_variable(sc_index)
        };
        cfg.internal_redirect_location = InternalRedirectLocation { path: route.path.clone(), destination };
        cfg
    }

    /// Variable holding the result of a list of splits compiled at `sc_index`, and the number of split client indices it takes.
    fn splits_variable(&self, splits: &[Split], sc_index: usize) -> (String, usize) {
        if self.is_two_way_dynamic(splits) {
            (self.variable_namer.map_for_split_clients(sc_index), SPLIT_CLIENT_AMOUNT_WHEN_WEIGHT_CHANGES_DYNAMIC_RELOAD)
        } else {
            (self.variable_namer.split_client_variable(sc_index), 1)
        }
    }

    /// Conditions of every match become a chain of maps; a main map over the concatenated first links picks the
    /// first match whose whole chain resolved to `1`.
    pub fn generate_matches_config(&self, route: &Route, scope: &LocationScope, ctx: &mut CompileContext) -> RoutingConfig {
        let index = ctx.matches_index;
        let sc_index = ctx.split_client_index;
        let namer = self.variable_namer;
        let mut cfg = RoutingConfig::default();

        for (i, m) in route.matches.iter().enumerate() {
            for (j, condition) in m.conditions.iter().enumerate() {
                let successful_result =
                    if j + 1 < m.conditions.len() { namer.matches_route_map_variable(index, i, j + 1) } else { "1".to_owned() };
                cfg.maps.push(Map {
                    source: source_for_condition(condition),
                    variable: namer.matches_route_map_variable(index, i, j),
                    parameters: generate_parameters_for_matches_route_map(&condition.value, &successful_result),
                });
            }
        }

        let mut sc_local_index = 0;
        let mut source = String::new();
        let mut parameters = vec![];
        for (i, m) in route.matches.iter().enumerate() {
            source.push_str(&namer.matches_route_map_variable(index, i, 0));
            let result = if m.splits.is_empty() {
                match_location_path(index, i)
            } else {
                let (variable, consumed) = self.splits_variable(&m.splits, sc_index + sc_local_index);
                sc_local_index += consumed;
                variable
            };
            parameters.push(Parameter { value: format!("~^{}1", "0".repeat(i)), result });
        }
        let default_result = if route.splits.is_empty() {
            matches_default_location_path(index)
        } else {
            self.splits_variable(&route.splits, sc_index + sc_local_index).0
        };
        parameters.push(Parameter { value: "default".to_owned(), result: default_result });

        let variable = namer.matches_route_main_map_variable(index);
        cfg.maps.push(Map { source, variable: variable.clone(), parameters });

        for (i, m) in route.matches.iter().enumerate() {
            if m.splits.is_empty() {
                let generated = self.generate_action_location(&match_location_path(index, i), m.action.as_ref(), scope, true, &route.path, ctx);
                cfg.push_location(generated);
            } else {
                let splits = self.generate_splits(&m.splits, scope, &route.path, ctx);
                cfg.append(splits);
            }
        }

        if route.splits.is_empty() {
            let generated = self.generate_action_location(&matches_default_location_path(index), route.action.as_ref(), scope, true, &route.path, ctx);
            cfg.push_location(generated);
        } else {
            let splits = self.generate_splits(&route.splits, scope, &route.path, ctx);
            cfg.append(splits);
        }

        cfg.internal_redirect_location = InternalRedirectLocation { path: route.path.clone(), destination: variable };
        ctx.matches_index += 1;
        cfg
    }
}

fn source_for_condition(condition: &Condition) -> String {
    if !condition.header.is_empty() {
        return format!("$http_{}", condition.header.replace('-', "_"));
    }
    if !condition.cookie.is_empty() {
        return format!("$cookie_{}", condition.cookie);
    }
    if !condition.argument.is_empty() {
        return format!("$arg_{}", condition.argument);
    }
    condition.variable.clone()
}

/// Map value of a condition and whether the condition is negated with a leading `!`.
fn generate_value_for_matches_route_map(matched_value: &str) -> (String, bool) {
    if matched_value.is_empty() {
        return ("\"\"".to_owned(), false);
    }
    let (value, is_negative) = match matched_value.strip_prefix('!') {
        Some(rest) => (rest, true),
        None => (matched_value, false),
    };
    if SPECIAL_MAP_PARAMETERS.contains(&value) {
        return (format!("\\{value}"), is_negative);
    }
    (format!("\"{value}\""), is_negative)
}

fn generate_parameters_for_matches_route_map(matched_value: &str, successful_result: &str) -> Vec<Parameter> {
    let (value, is_negative) = generate_value_for_matches_route_map(matched_value);
    let (value_result, default_result) = if is_negative { ("0", successful_result) } else { (successful_result, "0") };
    vec![
        Parameter { value, result: value_result.to_owned() },
        Parameter { value: "default".to_owned(), result: default_result.to_owned() },
    ]
}

#[cfg(test)]
mod tests {
    use kube::api::ObjectMeta;

    use super::*;
    use crate::{
        common::ResourceKey,
        compilers::locations::ErrorPageDetails,
        config::ConfigParams,
        resources::{Match, VirtualServer, VirtualServerSpec},
    };

    fn virtual_server() -> VirtualServer {
        VirtualServer {
            metadata: ObjectMeta { name: Some("cafe".to_owned()), namespace: Some("default".to_owned()), ..Default::default() },
            spec: VirtualServerSpec::default(),
        }
    }

    fn pass(upstream: &str) -> Option<Action> {
        Some(Action { pass: upstream.to_owned(), ..Default::default() })
    }

    fn split(weight: i32, upstream: &str) -> Split {
        Split { weight, action: pass(upstream) }
    }

    struct Fixture {
        vs: VirtualServer,
        params: ConfigParams,
        owner: ResourceKey,
        upstreams: BTreeMap<String, Upstream>,
    }

    impl Fixture {
        fn new() -> Self {
            let upstreams = BTreeMap::from([
                ("vs_default_cafe_tea-v1".to_owned(), Upstream { name: "tea-v1".to_owned(), service: "tea-svc-v1".to_owned(), ..Default::default() }),
                ("vs_default_cafe_tea-v2".to_owned(), Upstream { name: "tea-v2".to_owned(), service: "tea-svc-v2".to_owned(), ..Default::default() }),
            ]);
            Self { vs: virtual_server(), params: ConfigParams::default(), owner: ResourceKey::with_kind("cafe", "default", "VirtualServer"), upstreams }
        }

        fn scope(&self) -> LocationScope<'_> {
            LocationScope {
                params: &self.params,
                error_pages: ErrorPageDetails { pages: &[], index: 0, owner: &self.owner },
                location_snippets: "",
                enable_snippets: false,
                vsr: None,
            }
        }

        fn run<F: FnOnce(&RouteCompiler, &LocationScope) -> RoutingConfig>(&self, dynamic: bool, f: F) -> RoutingConfig {
            let upstream_namer = UpstreamNamer::for_virtual_server(&self.vs);
            let variable_namer = VariableNamer::new(&self.vs);
            let compiler = RouteCompiler { upstream_namer: &upstream_namer, upstreams: &self.upstreams, variable_namer: &variable_namer, dynamic_weight_changes: dynamic };
            f(&compiler, &self.scope())
        }
    }

    #[test]
    pub fn test_generate_splits_skips_zero_weights() {
        let fixture = Fixture::new();
        let route = Route { path: "/tea".to_owned(), splits: vec![split(0, "tea-v1"), split(100, "tea-v2")], ..Default::default() };
        let mut ctx = CompileContext::new();
        ctx.split_client_index = 1;

        let cfg = fixture.run(false, |compiler, scope| compiler.generate_default_splits_config(&route, scope, &mut ctx));

        assert_eq!(
            vec![SplitClient {
                source: "$request_id".to_owned(),
                variable: "$vs_default_cafe_splits_1".to_owned(),
                distributions: vec![Distribution { weight: "100%".to_owned(), value: "/internal_location_splits_1_split_1".to_owned() }],
            }],
            cfg.split_clients
        );
        assert_eq!(2, cfg.locations.len());
        assert_eq!("/internal_location_splits_1_split_0", cfg.locations[0].path);
        assert!(cfg.locations[0].internal);
        assert_eq!("http://vs_default_cafe_tea-v1$request_uri", cfg.locations[0].proxy_pass);
        assert_eq!("tea-svc-v1.default.svc", cfg.locations[0].proxy_ssl_name);
        assert_eq!(InternalRedirectLocation { path: "/tea".to_owned(), destination: "$vs_default_cafe_splits_1".to_owned() }, cfg.internal_redirect_location);
        assert_eq!(2, ctx.split_client_index);
        assert!(cfg.key_vals.is_empty());
    }

    #[test]
    pub fn test_two_way_split_with_dynamic_weight_changes() {
        let fixture = Fixture::new();
        let route = Route { path: "/tea".to_owned(), splits: vec![split(90, "tea-v1"), split(10, "tea-v2")], ..Default::default() };
        let mut ctx = CompileContext::new();

        let cfg = fixture.run(true, |compiler, scope| compiler.generate_default_splits_config(&route, scope, &mut ctx));

        assert_eq!(SPLIT_CLIENT_AMOUNT_WHEN_WEIGHT_CHANGES_DYNAMIC_RELOAD, cfg.split_clients.len());
        assert_eq!(SPLIT_CLIENT_AMOUNT_WHEN_WEIGHT_CHANGES_DYNAMIC_RELOAD, ctx.split_client_index);
        assert_eq!(
            vec![Distribution { weight: "100%".to_owned(), value: "/internal_location_splits_0_split_1".to_owned() }],
            cfg.split_clients[0].distributions
        );
        assert_eq!(
            vec![
                Distribution { weight: "90%".to_owned(), value: "/internal_location_splits_0_split_0".to_owned() },
                Distribution { weight: "10%".to_owned(), value: "/internal_location_splits_0_split_1".to_owned() },
            ],
            cfg.split_clients[90].distributions
        );
        assert_eq!("$vs_default_cafe_split_clients_0_90_10", cfg.split_clients[90].variable);

        let map = &cfg.maps[0];
        assert_eq!("$vs_default_cafe_keyval_split_clients_0", map.source);
        assert_eq!("$vs_default_cafe_map_split_clients_0", map.variable);
        assert_eq!(102, map.parameters.len());
        assert_eq!(
            Parameter { value: "default".to_owned(), result: "$vs_default_cafe_split_clients_0_100_0".to_owned() },
            map.parameters[101]
        );
        assert_eq!(
            vec![KeyValZone {
                name: "vs_default_cafe_keyval_zone_split_clients_0".to_owned(),
                size: "100k".to_owned(),
                state: "/etc/nginx/state_files/vs_default_cafe_keyval_zone_split_clients_0.json".to_owned(),
            }],
            cfg.key_val_zones
        );
        assert_eq!(vec![90, 10], cfg.two_way_split_clients[0].weights);
        assert_eq!("\"vs_default_cafe_keyval_key_split_clients_0\"", cfg.key_vals[0].key);
        assert_eq!("$vs_default_cafe_map_split_clients_0", cfg.internal_redirect_location.destination);
    }

    #[test]
    pub fn test_three_way_split_ignores_dynamic_weight_changes() {
        let fixture = Fixture::new();
        let route = Route {
            path: "/tea".to_owned(),
            splits: vec![split(50, "tea-v1"), split(25, "tea-v2"), split(25, "tea-v2")],
            ..Default::default()
        };
        let mut ctx = CompileContext::new();

        let cfg = fixture.run(true, |compiler, scope| compiler.generate_default_splits_config(&route, scope, &mut ctx));

        assert_eq!(1, cfg.split_clients.len());
        assert_eq!(3, cfg.split_clients[0].distributions.len());
        assert!(cfg.key_val_zones.is_empty());
    }

    #[test]
    pub fn test_generate_matches_config() {
        let fixture = Fixture::new();
        let route = Route {
            path: "/tea".to_owned(),
            matches: vec![
                Match {
                    conditions: vec![
                        Condition { header: "x-version".to_owned(), value: "v2".to_owned(), ..Default::default() },
                        Condition { cookie: "user".to_owned(), value: "!default".to_owned(), ..Default::default() },
                    ],
                    action: pass("tea-v2"),
                    splits: vec![],
                },
                Match {
                    conditions: vec![Condition { argument: "beta".to_owned(), value: "true".to_owned(), ..Default::default() }],
                    action: None,
                    splits: vec![split(30, "tea-v1"), split(70, "tea-v2")],
                },
            ],
            action: pass("tea-v1"),
            ..Default::default()
        };
        let mut ctx = CompileContext::new();
        ctx.split_client_index = 3;

        let cfg = fixture.run(false, |compiler, scope| compiler.generate_matches_config(&route, scope, &mut ctx));

        let expected_maps = vec![
            Map {
                source: "$http_x_version".to_owned(),
                variable: "$vs_default_cafe_matches_0_match_0_cond_0".to_owned(),
                parameters: vec![
                    Parameter { value: "\"v2\"".to_owned(), result: "$vs_default_cafe_matches_0_match_0_cond_1".to_owned() },
                    Parameter { value: "default".to_owned(), result: "0".to_owned() },
                ],
            },
            Map {
                source: "$cookie_user".to_owned(),
                variable: "$vs_default_cafe_matches_0_match_0_cond_1".to_owned(),
                parameters: vec![
                    Parameter { value: "\\default".to_owned(), result: "0".to_owned() },
                    Parameter { value: "default".to_owned(), result: "1".to_owned() },
                ],
            },
            Map {
                source: "$arg_beta".to_owned(),
                variable: "$vs_default_cafe_matches_0_match_1_cond_0".to_owned(),
                parameters: vec![
                    Parameter { value: "\"true\"".to_owned(), result: "1".to_owned() },
                    Parameter { value: "default".to_owned(), result: "0".to_owned() },
                ],
            },
            Map {
                source: "$vs_default_cafe_matches_0_match_0_cond_0$vs_default_cafe_matches_0_match_1_cond_0".to_owned(),
                variable: "$vs_default_cafe_matches_0".to_owned(),
                parameters: vec![
                    Parameter { value: "~^1".to_owned(), result: "/internal_location_matches_0_match_0".to_owned() },
                    Parameter { value: "~^01".to_owned(), result: "$vs_default_cafe_splits_3".to_owned() },
                    Parameter { value: "default".to_owned(), result: "/internal_location_matches_0_default".to_owned() },
                ],
            },
        ];
        pretty_assertions::assert_eq!(expected_maps, cfg.maps);
        assert_eq!(
            vec![
                "/internal_location_matches_0_match_0",
                "/internal_location_splits_3_split_0",
                "/internal_location_splits_3_split_1",
                "/internal_location_matches_0_default"
            ],
            cfg.locations.iter().map(|l| l.path.as_str()).collect::<Vec<_>>()
        );
        assert_eq!(InternalRedirectLocation { path: "/tea".to_owned(), destination: "$vs_default_cafe_matches_0".to_owned() }, cfg.internal_redirect_location);
        assert_eq!(1, ctx.matches_index);
        assert_eq!(4, ctx.split_client_index);
    }

    #[test]
    pub fn test_matches_with_dynamic_two_way_splits_reserve_indices() {
        let fixture = Fixture::new();
        let route = Route {
            path: "/tea".to_owned(),
            matches: vec![Match {
                conditions: vec![Condition { variable: "$request_method".to_owned(), value: "POST".to_owned(), ..Default::default() }],
                action: None,
                splits: vec![split(50, "tea-v1"), split(50, "tea-v2")],
            }],
            splits: vec![split(20, "tea-v1"), split(80, "tea-v2")],
            ..Default::default()
        };
        let mut ctx = CompileContext::new();

        let cfg = fixture.run(true, |compiler, scope| compiler.generate_matches_config(&route, scope, &mut ctx));

        let main_map = cfg.maps.iter().find(|m| m.variable == "$vs_default_cafe_matches_0").unwrap();
        assert_eq!("$vs_default_cafe_map_split_clients_0", main_map.parameters[0].result);
        assert_eq!("$vs_default_cafe_map_split_clients_101", main_map.parameters[1].result);
        assert_eq!(2 * SPLIT_CLIENT_AMOUNT_WHEN_WEIGHT_CHANGES_DYNAMIC_RELOAD, cfg.split_clients.len());
        assert_eq!(vec![0, 101], cfg.two_way_split_clients.iter().map(|s| s.split_client_index).collect::<Vec<_>>());
    }

    #[test]
    pub fn test_generate_value_for_matches_route_map() {
        assert_eq!(("\"\"".to_owned(), false), generate_value_for_matches_route_map(""));
        assert_eq!(("\"abc\"".to_owned(), false), generate_value_for_matches_route_map("abc"));
        assert_eq!(("\"abc\"".to_owned(), true), generate_value_for_matches_route_map("!abc"));
        assert_eq!(("\\hostnames".to_owned(), false), generate_value_for_matches_route_map("hostnames"));
        assert_eq!(("\\volatile".to_owned(), true), generate_value_for_matches_route_map("!volatile"));
    }
}

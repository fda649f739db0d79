//! Limited-memory BFGS with the More–Thuente line search.

use log::info;

/// Stopping and line-search parameters.
pub(crate) struct LbfgsConfig {
    /// Maximum number of iterations; `0` means until convergence.
    pub max_iterations: u64,
    /// Gradient convergence tolerance: stop when `||g|| / max(1, ||x||)`
    /// falls below it.
    pub epsilon: f64,
    /// Objective convergence tolerance over the `past` window.
    pub delta: f64,
    /// Distance of the iteration the objective is compared against.
    pub past: usize,
    /// Number of history pairs kept for the inverse-Hessian approximation.
    pub history: usize,
}

impl Default for LbfgsConfig {
    fn default() -> Self {
        Self {
            max_iterations: 0,
            epsilon: 1e-5,
            delta: 1e-5,
            past: 10,
            history: 10,
        }
    }
}

const FTOL: f64 = 1e-4;
const GTOL: f64 = 0.9;
const XTOL: f64 = 1e-16;
const MIN_STEP: f64 = 1e-20;
const MAX_STEP: f64 = 1e20;
const MAX_LINESEARCH: usize = 40;

struct HistoryPair {
    s: Vec<f64>,
    y: Vec<f64>,
    ys: f64,
    alpha: f64,
}

/// Minimizes `evaluate` starting from `x`, returning the final objective.
///
/// `evaluate` must fill the gradient slice and return the objective value;
/// it is the single point of contact with the model, so the caller keeps
/// ownership of everything the objective reads.
pub(crate) fn optimize<E>(x: &mut [f64], mut evaluate: E, config: &LbfgsConfig) -> f64
where
    E: FnMut(&[f64], &mut [f64]) -> f64,
{
    let n = x.len();
    let m = config.history;
    let mut g = vec![0.0; n];
    let mut gp = vec![0.0; n];
    let mut xp = vec![0.0; n];
    let mut d = vec![0.0; n];
    let mut pf = vec![0.0; config.past.max(1)];
    let mut lm: Vec<HistoryPair> = (0..m)
        .map(|_| HistoryPair {
            s: vec![0.0; n],
            y: vec![0.0; n],
            ys: 0.0,
            alpha: 0.0,
        })
        .collect();

    let mut fx = evaluate(x, &mut g);
    pf[0] = fx;

    for i in 0..n {
        d[i] = -g[i];
    }

    let xnorm = norm(x).max(1.0);
    let gnorm = norm(&g);
    if gnorm / xnorm <= config.epsilon {
        info!("L-BFGS optimization terminated with status: already minimized");
        return fx;
    }

    let mut step = 1.0 / norm(&d);
    let mut k = 1u64;
    let mut end = 0usize;
    let status;

    loop {
        xp.copy_from_slice(x);
        gp.copy_from_slice(&g);

        let ls = line_search(x, &mut fx, &mut g, &d, &mut step, &xp, &mut evaluate);
        let trials = match ls {
            Ok(trials) => trials,
            Err(e) => {
                x.copy_from_slice(&xp);
                g.copy_from_slice(&gp);
                status = e;
                break;
            }
        };

        let xnorm = norm(x);
        let gnorm = norm(&g);
        progress(x, fx, xnorm, gnorm, step, k, trials);

        if gnorm / xnorm.max(1.0) <= config.epsilon {
            status = "convergence reached";
            break;
        }
        if config.past <= k as usize {
            let rate = (pf[k as usize % config.past] - fx) / fx;
            if rate < config.delta {
                status = "objective stopped improving";
                break;
            }
        }
        pf[k as usize % config.past] = fx;
        if config.max_iterations != 0 && config.max_iterations < k + 1 {
            status = "maximum number of iterations reached";
            break;
        }

        let pair = &mut lm[end];
        let mut ys = 0.0;
        let mut yy = 0.0;
        for i in 0..n {
            pair.s[i] = x[i] - xp[i];
            pair.y[i] = g[i] - gp[i];
            ys += pair.y[i] * pair.s[i];
            yy += pair.y[i] * pair.y[i];
        }
        pair.ys = ys;

        let bound = (m as u64).min(k) as usize;
        k += 1;
        end = (end + 1) % m;

        for i in 0..n {
            d[i] = -g[i];
        }
        let mut j = end;
        for _ in 0..bound {
            j = (j + m - 1) % m;
            let pair = &mut lm[j];
            pair.alpha = dot(&pair.s, &d) / pair.ys;
            let alpha = pair.alpha;
            for i in 0..n {
                d[i] -= alpha * pair.y[i];
            }
        }
        for v in d.iter_mut() {
            *v *= ys / yy;
        }
        for _ in 0..bound {
            let pair = &lm[j];
            let beta = dot(&pair.y, &d) / pair.ys;
            for i in 0..n {
                d[i] += (pair.alpha - beta) * pair.s[i];
            }
            j = (j + 1) % m;
        }

        step = 1.0;
    }

    info!("L-BFGS optimization terminated with status: {status}");
    fx
}

fn progress(x: &[f64], fx: f64, xnorm: f64, gnorm: f64, step: f64, k: u64, trials: usize) {
    let nactives = x.iter().filter(|&&v| v != 0.0).count();
    info!(
        "Iteration {k}: llhood = {fx}, xnorm = {xnorm}, gnorm = {gnorm}, \
         step = {step}, trials = {trials}, nactives = {nactives}/{}",
        x.len(),
    );
}

#[inline(always)]
fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

#[inline(always)]
fn norm(a: &[f64]) -> f64 {
    dot(a, a).sqrt()
}

/// More–Thuente line search: finds a step along `d` satisfying the strong
/// Wolfe conditions, updating `x`, `f`, `g`, and `stp` in place.
fn line_search<E>(
    x: &mut [f64],
    f: &mut f64,
    g: &mut [f64],
    d: &[f64],
    stp: &mut f64,
    xp: &[f64],
    evaluate: &mut E,
) -> Result<usize, &'static str>
where
    E: FnMut(&[f64], &mut [f64]) -> f64,
{
    if *stp <= 0.0 {
        return Err("line search: invalid step");
    }
    let dginit = dot(g, d);
    if dginit > 0.0 {
        return Err("line search: direction is not a descent direction");
    }

    let mut brackt = false;
    let mut stage1 = true;
    let mut uinfo = 0;
    let finit = *f;
    let dgtest = FTOL * dginit;
    let mut width = MAX_STEP - MIN_STEP;
    let mut prev_width = 2.0 * width;

    // stx: best step so far; sty: the other endpoint of the interval.
    let mut stx: f64 = 0.0;
    let mut sty: f64 = 0.0;
    let mut fx = finit;
    let mut fy = finit;
    let mut dgx = dginit;
    let mut dgy = dginit;
    let mut count = 0usize;

    loop {
        let (stmin, stmax) = if brackt {
            (stx.min(sty), stx.max(sty))
        } else {
            (stx, *stp + 4.0 * (*stp - stx))
        };

        *stp = stp.clamp(MIN_STEP, MAX_STEP);

        // On an unusable trial, take the best step found so far.
        if (brackt && (*stp <= stmin || stmax <= *stp || uinfo != 0))
            || (brackt && stmax - stmin <= XTOL * stmax)
        {
            *stp = stx;
        }

        for i in 0..x.len() {
            x[i] = xp[i] + *stp * d[i];
        }
        *f = evaluate(x, g);
        count += 1;

        let dg = dot(g, d);
        let ftest1 = finit + *stp * dgtest;

        if brackt && (*stp <= stmin || stmax <= *stp || uinfo != 0) {
            return Err("line search: rounding errors prevent further progress");
        }
        if *stp == MAX_STEP && *f <= ftest1 && dg <= dgtest {
            return Err("line search: the step became larger than the maximum");
        }
        if *stp == MIN_STEP && (ftest1 < *f || dgtest <= dg) {
            return Err("line search: the step became smaller than the minimum");
        }
        if brackt && stmax - stmin <= XTOL * stmax {
            return Err("line search: the interval width is below the tolerance");
        }
        if *f <= ftest1 && dg.abs() <= GTOL * (-dginit) {
            // Sufficient decrease and curvature conditions hold.
            return Ok(count);
        }
        if count >= MAX_LINESEARCH {
            return Err("line search: the maximum number of trials was reached");
        }

        if stage1 && *f <= ftest1 && FTOL.min(GTOL) * dginit <= dg {
            stage1 = false;
        }

        // In the first stage a modified function with the directional
        // derivative test subtracted keeps the minimizer bracketed.
        if stage1 && ftest1 < *f && *f <= fx {
            let fm = *f - *stp * dgtest;
            let mut fxm = fx - stx * dgtest;
            let mut fym = fy - sty * dgtest;
            let dgm = dg - dgtest;
            let mut dgxm = dgx - dgtest;
            let mut dgym = dgy - dgtest;

            uinfo = update_trial_interval(
                &mut stx, &mut fxm, &mut dgxm, &mut sty, &mut fym, &mut dgym, stp, fm, dgm, stmin,
                stmax, &mut brackt,
            );

            fx = fxm + stx * dgtest;
            fy = fym + sty * dgtest;
            dgx = dgxm + dgtest;
            dgy = dgym + dgtest;
        } else {
            uinfo = update_trial_interval(
                &mut stx, &mut fx, &mut dgx, &mut sty, &mut fy, &mut dgy, stp, *f, dg, stmin,
                stmax, &mut brackt,
            );
        }

        if brackt {
            if 0.66 * prev_width <= (sty - stx).abs() {
                *stp = stx + 0.5 * (sty - stx);
            }
            prev_width = width;
            width = (sty - stx).abs();
        }
    }
}

/// Minimizer of the cubic interpolating `(u, fu, du)` and `(v, fv, dv)`.
fn cubic_minimizer(u: f64, fu: f64, du: f64, v: f64, fv: f64, dv: f64) -> f64 {
    let d = v - u;
    let theta = (fu - fv) * 3.0 / d + du + dv;
    let s = theta.abs().max(du.abs()).max(dv.abs());
    let a = theta / s;
    let mut gamma = s * (a * a - (du / s) * (dv / s)).sqrt();
    if v < u {
        gamma = -gamma;
    }
    let p = gamma - du + theta;
    let q = gamma - du + gamma + dv;
    u + p / q * d
}

/// Variant used when the minimizer may fall outside the interval; clips to
/// `[xmin, xmax]`.
#[allow(clippy::too_many_arguments)]
fn cubic_minimizer2(u: f64, fu: f64, du: f64, v: f64, fv: f64, dv: f64, xmin: f64, xmax: f64) -> f64 {
    let d = v - u;
    let theta = (fu - fv) * 3.0 / d + du + dv;
    let s = theta.abs().max(du.abs()).max(dv.abs());
    let a = theta / s;
    let mut gamma = s * (a * a - (du / s) * (dv / s)).max(0.0).sqrt();
    if u < v {
        gamma = -gamma;
    }
    let p = gamma - dv + theta;
    let q = gamma - dv + gamma + du;
    let r = p / q;
    if r < 0.0 && gamma != 0.0 {
        v - r * d
    } else if a < 0.0 {
        xmax
    } else {
        xmin
    }
}

/// Minimizer of the quadratic interpolating `(u, fu, du)` and `(v, fv)`.
fn quad_minimizer(u: f64, fu: f64, du: f64, v: f64, fv: f64) -> f64 {
    let a = v - u;
    u + du / ((fu - fv) / a + du) / 2.0 * a
}

/// Minimizer of the quadratic interpolating derivatives at `u` and `v`.
fn quad_minimizer2(u: f64, du: f64, v: f64, dv: f64) -> f64 {
    let a = u - v;
    v + dv / (dv - du) * a
}

/// Updates the interval of uncertainty and computes the next trial step.
///
/// `x`/`fx`/`dx` hold the endpoint with the least function value, `y`/`fy`/
/// `dy` the other endpoint, and `t`/`ft`/`dt` the current trial.
#[allow(clippy::too_many_arguments)]
fn update_trial_interval(
    x: &mut f64,
    fx: &mut f64,
    dx: &mut f64,
    y: &mut f64,
    fy: &mut f64,
    dy: &mut f64,
    t: &mut f64,
    ft: f64,
    dt: f64,
    tmin: f64,
    tmax: f64,
    brackt: &mut bool,
) -> i32 {
    if *brackt {
        if *t <= x.min(*y) || x.max(*y) <= *t {
            // The trial value is out of the interval.
            return 1;
        }
        if 0.0 <= *dx * (*t - *x) {
            // The function must decrease from x.
            return 1;
        }
        if tmax < tmin {
            return 1;
        }
    }

    let dsign = dt * (*dx / dx.abs()) < 0.0;
    let bound;
    let mut newt;

    if *fx < ft {
        // Higher function value: the minimum is bracketed.
        *brackt = true;
        bound = true;
        let mc = cubic_minimizer(*x, *fx, *dx, *t, ft, dt);
        let mq = quad_minimizer(*x, *fx, *dx, *t, ft);
        if (mc - *x).abs() < (mq - *x).abs() {
            newt = mc;
        } else {
            newt = mc + 0.5 * (mq - mc);
        }
    } else if dsign {
        // Lower value, derivatives of opposite sign: bracketed.
        *brackt = true;
        bound = false;
        let mc = cubic_minimizer(*x, *fx, *dx, *t, ft, dt);
        let mq = quad_minimizer2(*x, *dx, *t, dt);
        if (mc - *t).abs() > (mq - *t).abs() {
            newt = mc;
        } else {
            newt = mq;
        }
    } else if dt.abs() < dx.abs() {
        // Lower value, same sign, decreasing derivative magnitude.
        bound = true;
        let mc = cubic_minimizer2(*x, *fx, *dx, *t, ft, dt, tmin, tmax);
        let mq = quad_minimizer2(*x, *dx, *t, dt);
        if *brackt {
            if (*t - mc).abs() < (*t - mq).abs() {
                newt = mc;
            } else {
                newt = mq;
            }
        } else if (*t - mc).abs() > (*t - mq).abs() {
            newt = mc;
        } else {
            newt = mq;
        }
    } else {
        // Lower value, same sign, increasing magnitude.
        bound = false;
        if *brackt {
            newt = cubic_minimizer(*t, ft, dt, *y, *fy, *dy);
        } else if *x < *t {
            newt = tmax;
        } else {
            newt = tmin;
        }
    }

    if *fx < ft {
        *y = *t;
        *fy = ft;
        *dy = dt;
    } else {
        if dsign {
            *y = *x;
            *fy = *fx;
            *dy = *dx;
        }
        *x = *t;
        *fx = ft;
        *dx = dt;
    }

    newt = newt.clamp(tmin, tmax);
    if *brackt && bound {
        let mq = *x + 0.66 * (*y - *x);
        if *x < *y {
            newt = newt.min(mq);
        } else {
            newt = newt.max(mq);
        }
    }

    *t = newt;
    0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quadratic_bowl() {
        let mut x = vec![0.0, 0.0];
        let fx = optimize(
            &mut x,
            |x, g| {
                g[0] = 2.0 * (x[0] - 3.0);
                g[1] = 20.0 * (x[1] + 1.0);
                (x[0] - 3.0).powi(2) + 10.0 * (x[1] + 1.0).powi(2)
            },
            &LbfgsConfig::default(),
        );
        assert!((x[0] - 3.0).abs() < 1e-4, "x0 = {}", x[0]);
        assert!((x[1] + 1.0).abs() < 1e-4, "x1 = {}", x[1]);
        assert!(fx < 1e-8);
    }

    #[test]
    fn test_rosenbrock() {
        let mut x = vec![-1.2, 1.0];
        let config = LbfgsConfig {
            max_iterations: 500,
            ..LbfgsConfig::default()
        };
        let fx = optimize(
            &mut x,
            |x, g| {
                let a = 1.0 - x[0];
                let b = x[1] - x[0] * x[0];
                g[0] = -2.0 * a - 400.0 * x[0] * b;
                g[1] = 200.0 * b;
                a * a + 100.0 * b * b
            },
            &config,
        );
        assert!((x[0] - 1.0).abs() < 1e-3, "x0 = {}", x[0]);
        assert!((x[1] - 1.0).abs() < 1e-3, "x1 = {}", x[1]);
        assert!(fx < 1e-6);
    }

    #[test]
    fn test_descends_from_start() {
        let mut x = vec![5.0, -4.0, 3.0];
        let start = 5.0f64 * 5.0 + 4.0 * 4.0 + 3.0 * 3.0;
        let fx = optimize(
            &mut x,
            |x, g| {
                let mut fx = 0.0;
                for i in 0..x.len() {
                    g[i] = 2.0 * x[i];
                    fx += x[i] * x[i];
                }
                fx
            },
            &LbfgsConfig::default(),
        );
        assert!(fx < start);
        assert!(x.iter().all(|v| v.abs() < 1e-4));
    }
}
